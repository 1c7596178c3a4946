pub mod config;
pub mod error;
pub mod item;
pub mod proto;
pub mod types;

pub use error::{ExitCause, ExitCode, ExitInfo, ExitResult};
pub use item::SyncFileItem;
pub use types::{NodeId, PinState, VfsStatus, VirtualFileMode};
