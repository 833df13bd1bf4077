pub mod ancestry;
pub mod elements;
pub mod jmi;
pub mod permissions;
pub mod snapshot;
pub mod subtree;
pub mod validators;

pub use ancestry::assert_no_cycle;
pub use elements::{ElementEngine, FindOptions, SearchOptions};
pub use permissions::{can_read, can_write};
pub use snapshot::SnapshotStore;
pub use subtree::resolve_subtree;
pub use validators::Validators;
