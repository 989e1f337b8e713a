#[allow(clippy::module_inception)]
pub mod fsck;
pub mod fsck_types;
pub mod listing;
pub mod refs;

pub use fsck::{check_image, run_fsck};
pub use fsck_types::{Check, Summary, Verdict, Violation};
pub use listing::{list_directory, Listing};
pub use refs::{BlockUsage, RefTables};
