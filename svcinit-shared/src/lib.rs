//! svcinit shared code
//!
//! Error taxonomy and default constants used by both the bootstrap
//! library (svcinit) and the command-line front end.

pub mod constants;
pub mod errors;

pub use errors::{ErrorKind, InitError, InitResult};
