mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{AlreadyRunningError, MissingStartTimeError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, StopReason};
}
