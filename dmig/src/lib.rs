pub mod config;
pub mod loc;
pub mod oauth2;

mod error;

pub use crate::config::Config;
pub use crate::error::*;
