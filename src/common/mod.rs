mod program_id;
mod rights_id;

pub use program_id::ProgramId;
pub use rights_id::RightsId;
