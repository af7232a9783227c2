//! Core layer - storage traits and type resolution.
//!
//! This module provides:
//! - [`StorageFile`] / [`TreeReader`] - The storage engine contract
//! - [`LeafBuffer`] / [`WrappedObject`] / [`Product`] - Decode targets
//! - [`TypeDescriptor`] - Parsed class strings
//! - [`TypeRegistry`] - Descriptor to decode-target resolution
//! - [`Shape`] - Binary layout of wrapped objects

mod traits;
mod descriptor;
mod registry;
mod shape;
mod compression;

pub use traits::{
    StorageFile, TreeReader, KeyInfo, BranchInfo, TREE_CLASS,
    LeafBuffer, LeafSlot, ObjectSlot, WrappedObject, Product,
};
pub use descriptor::TypeDescriptor;
pub use registry::{TypeRegistry, Factory};
pub use shape::{Shape, RecordLayout, ShapedObject};
pub use compression::{compress, decompress, is_compressed};
