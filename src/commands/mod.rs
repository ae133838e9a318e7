//! Commands
//!
//! Transport-agnostic entry points. A transport (HTTP server, desktop IPC)
//! authenticates the caller and passes the user id plus the decoded request;
//! every handler returns a `CommandResponse`.

pub mod generation;
pub mod health;
pub mod sessions;
pub mod settings;

pub use generation::*;
pub use health::*;
pub use sessions::*;
pub use settings::*;
