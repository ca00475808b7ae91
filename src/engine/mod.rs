// Core encoding engine - independent of the command line surface

pub mod cancel;
pub mod coordinator;
pub mod core;
pub mod hardware;
pub mod probe;
pub mod process;
pub mod subtitles;

pub use cancel::{CancelToken, InFlight};
pub use coordinator::RunCoordinator;
pub use core::*;
pub use hardware::HardwareBackend;
