//! Data Models
//!
//! Serializable types shared by services, storage, and command handlers.

pub mod analytics;
pub mod generation;
pub mod response;
pub mod session;
pub mod settings;

pub use analytics::*;
pub use generation::*;
pub use response::*;
pub use session::*;
pub use settings::*;
