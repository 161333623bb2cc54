//! # meetsync common library
//!
//! Shared code for the meetsync workspace:
//! - Error type and result alias
//! - Bootstrap configuration loading and root folder resolution
//! - Date window helpers used when querying the remote results source

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::DateWindow;
