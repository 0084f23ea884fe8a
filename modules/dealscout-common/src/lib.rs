pub mod types;
pub mod config;
pub mod error;
pub mod scoring;
pub mod template;

pub use types::*;
pub use config::Config;
pub use error::DealScoutError;
