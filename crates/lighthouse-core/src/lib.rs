pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::LighthouseConfig;
pub use error::{LighthouseError, Result};
pub use events::SessionEvent;
pub use types::*;
