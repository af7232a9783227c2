//! # evtree
//!
//! Lazy, entry-synchronized access to named data products stored in
//! columnar event trees.
//!
//! A tree is a table of entries whose columns are branches. Scalar branches
//! hold primitive leaves; object branches hold serialized objects, usually
//! behind a presence-flagged wrapper. A [`FileSession`] registers one
//! [`EntryCursor`] per tree; a cursor hands out views of the products a
//! caller asks for and keeps them in step with the loaded entry. Branches
//! nobody asked for are never decoded.
//!
//! ## Modules
//!
//! - [`util`] - Errors, leaf types, decoded values
//! - [`core`] - Storage traits, type descriptors, type registry
//! - [`store`] - In-memory and EVTR file storage engines
//! - [`tree`] - Sessions, cursors, catalogs and views
//!
//! ## Example
//!
//! ```ignore
//! use evtree::prelude::*;
//!
//! let mut session = FileSession::open("events.evtr")?;
//! let muons = session.product("patMuons", Some("Events"))?;
//! let cursor = session.cursor_mut("Events").unwrap();
//! while let Some(entry) = cursor.advance()? {
//!     for i in 0..muons.len()? {
//!         if let Some(muon) = muons.element_at(i)? {
//!             println!("{entry}: {muon}");
//!         }
//!     }
//! }
//! ```

pub mod util;
pub mod core;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use util::{Error, Result, Value, LeafType};
pub use tree::{FileSession, EntryCursor, SessionOptions, View};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Value, LeafType};
    pub use crate::core::{StorageFile, TreeReader, TypeDescriptor, TypeRegistry, WrappedObject, Product};
    pub use crate::store::{MemoryFile, StoreFile, StoreWriter, TreeBuilder};
    pub use crate::tree::{
        BranchCatalog, BranchType, EntryCursor, FileSession, ProductView, SessionOptions, View,
        WrapperView,
    };
}
