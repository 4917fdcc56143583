mod channel;
mod config;
mod error;
mod types;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use types::*;
