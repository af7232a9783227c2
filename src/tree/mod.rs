//! Lazy product layer over the storage traits.
//!
//! - [`FileSession`] - opens a file and registers one cursor per tree
//! - [`EntryCursor`] - iterates entries and binds products on request
//! - [`BranchCatalog`] - branch types and label resolution
//! - [`View`] - [`ProductView`] for primitive leaves, [`WrapperView`] for objects

mod catalog;
mod cursor;
mod options;
mod session;
mod view;

pub use catalog::{BranchCatalog, BranchType, ProductKind};
pub use cursor::{Entries, EntryCursor};
pub use options::{SessionOptions, VALID_OPTIONS};
pub use session::FileSession;
pub use view::{ProductView, View, WrapperView};
