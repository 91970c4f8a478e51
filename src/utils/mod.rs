pub mod cursor;
pub mod global_id;

pub use cursor::{cursor_to_offset, offset_to_cursor};
pub use global_id::{GlobalId, GlobalIdError, ResolvedGlobalId};
