//! Utility types used throughout the crate.
//!
//! - [`LeafType`] - Closed set of primitive leaf kinds
//! - [`Value`] - Decoded leaf or object element
//! - [`Error`] / [`Result`] - Error handling

mod error;
mod leaf;
mod value;

pub use error::*;
pub use leaf::*;
pub use value::*;
