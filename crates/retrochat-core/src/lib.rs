pub mod codes;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod sync;
pub mod viewer;

pub use config::{RoomConfig, SyncConfig};
pub use error::{ChatError, ChatResult, ErrorKind};
pub use lifecycle::RoomService;
pub use session::{SessionState, ViewerSession};
pub use viewer::Viewer;
