pub mod config;
pub mod format;
pub mod simulator;
pub mod source;
pub mod stages;
pub mod store;
pub mod types;

pub use types::*;
