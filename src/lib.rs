pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod helpers;

pub use error::{Error, Result};
