pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{GeneralConfig, PlaystateConfig, StorageConfig};
pub use error::{PlaystateError, Result};
pub use types::*;
