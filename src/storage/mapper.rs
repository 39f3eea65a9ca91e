use super::Storage;
use crate::HacResult;

/// Something that can be parsed out of a [`Storage`], see [`Storage::map_to_storage`].
pub trait FromStorage: Sized {
    type Args;

    fn from_storage(parent: Storage, args: Self::Args) -> HacResult<Self>;
}
