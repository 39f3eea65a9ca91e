use core::fmt;

/// Rights id of a titlekey encrypted NCA, all zero when the key area is used.
#[binrw::binrw]
#[brw(big)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RightsId(pub u128);

impl RightsId {
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RightsId({:032x})", &self.0)
    }
}

impl fmt::Display for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", &self.0)
    }
}
