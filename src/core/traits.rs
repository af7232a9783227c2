//! Abstract traits for the storage engine and its decode targets.
//!
//! These traits define the interface between a concrete store (see
//! [`crate::store`]) and the lazy product layer in [`crate::tree`]. The
//! product layer never touches bytes on disk; it asks a [`TreeReader`] to
//! bind decode targets and to load entries into them.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::util::{Error, LeafType, Result, Value};

/// Class name of keys holding a tree.
pub const TREE_CLASS: &str = "TTree";

// ============================================================================
// Storage Traits
// ============================================================================

/// A top-level key of a storage file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub class_name: String,
}

impl KeyInfo {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self { name: name.into(), class_name: class_name.into() }
    }

    /// Check if this key holds a tree.
    pub fn is_tree(&self) -> bool {
        self.class_name == TREE_CLASS
    }
}

/// A branch as listed by its tree: name plus declared class.
///
/// An empty `class_name` means the branch holds plain leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub class_name: String,
}

impl BranchInfo {
    pub fn is_leaf(&self) -> bool {
        self.class_name.is_empty()
    }
}

/// Reader interface for an open storage file.
pub trait StorageFile: Send {
    /// Get the file name/path.
    fn name(&self) -> &str;

    /// List the top-level keys, in file order. A name may repeat.
    fn keys(&self) -> Vec<KeyInfo>;

    /// Open a tree by name.
    fn tree(&self, name: &str) -> Result<Box<dyn TreeReader>>;

    /// Look up a key by name.
    fn key(&self, name: &str) -> Option<KeyInfo> {
        self.keys().into_iter().find(|k| k.name == name)
    }
}

/// Reader interface for one entry-indexed tree.
///
/// Loading an entry only decodes the branches that were bound through
/// [`bind_leaf`](Self::bind_leaf) or [`bind_object`](Self::bind_object).
pub trait TreeReader: Send {
    /// Get the tree name.
    fn name(&self) -> &str;

    /// Number of entries. Fixed for the lifetime of the reader.
    fn num_entries(&self) -> u64;

    /// List the branches with their declared class.
    fn branches(&self) -> Vec<BranchInfo>;

    /// Type name of the leaf called `name`, if such a leaf exists.
    fn leaf_type_name(&self, name: &str) -> Option<String>;

    /// Title of the branch called `name`.
    fn branch_title(&self, name: &str) -> Option<String>;

    /// Alias table as `(alias, title)` pairs, `None` if the tree has none.
    fn aliases(&self) -> Option<Vec<(String, String)>>;

    /// Register a decode target for the leaf called `leaf`.
    ///
    /// Binding the same leaf twice returns the same slot. A target bound
    /// after an entry was loaded holds that entry on return; if it cannot
    /// be decoded nothing is registered.
    fn bind_leaf(&mut self, leaf: &str) -> Result<LeafSlot>;

    /// Register `target` as the decode target of the object branch `branch`.
    ///
    /// Like [`bind_leaf`](Self::bind_leaf), the target is filled with the
    /// loaded entry, if any, before it is registered.
    fn bind_object(&mut self, branch: &str, target: ObjectSlot) -> Result<()>;

    /// Load entry `index` into every bound target.
    ///
    /// All or nothing: on error every target keeps the previous entry.
    fn load_entry(&mut self, index: u64) -> Result<()>;
}

// ============================================================================
// Decode Targets
// ============================================================================

/// Decode target of a leaf: the elements of the current entry.
#[derive(Debug)]
pub struct LeafBuffer {
    leaf_type: LeafType,
    raw: Vec<u8>,
}

/// Shared handle to a leaf decode target.
pub type LeafSlot = Arc<RwLock<LeafBuffer>>;

impl LeafBuffer {
    pub fn new(leaf_type: LeafType) -> Self {
        Self { leaf_type, raw: Vec::new() }
    }

    /// Create a shared slot.
    pub fn slot(leaf_type: LeafType) -> LeafSlot {
        Arc::new(RwLock::new(Self::new(leaf_type)))
    }

    pub fn leaf_type(&self) -> LeafType {
        self.leaf_type
    }

    /// Number of elements held for the current entry.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len() / self.leaf_type.num_bytes()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        let n = self.leaf_type.num_bytes();
        let start = index.checked_mul(n)?;
        self.raw.get(start..start.checked_add(n)?).and_then(|b| self.leaf_type.decode(b))
    }

    /// All elements of the current entry.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Replace the content with one entry's raw bytes.
    pub fn fill(&mut self, raw: &[u8]) -> Result<()> {
        let n = self.leaf_type.num_bytes();
        if raw.len() % n != 0 {
            return Err(Error::invalid(format!(
                "{} bytes is not a whole number of {}",
                raw.len(),
                self.leaf_type
            )));
        }
        self.raw.clear();
        self.raw.extend_from_slice(raw);
        Ok(())
    }
}

/// Product extracted from a wrapped object.
pub trait Product: Send + Sync {
    /// Element count, `None` if the product is not a sequence.
    fn len(&self) -> Option<usize>;

    /// Element at `index` of a sequence product.
    fn element(&self, index: usize) -> Option<Value>;

    /// Copy of the whole product.
    fn value(&self) -> Value;
}

impl Product for Value {
    fn len(&self) -> Option<usize> {
        self.as_list().map(<[Value]>::len)
    }

    fn element(&self, index: usize) -> Option<Value> {
        self.as_list().and_then(|items| items.get(index)).cloned()
    }

    fn value(&self) -> Value {
        self.clone()
    }
}

/// Type-erased decode target of an object branch.
pub trait WrappedObject: Send + Sync {
    /// Type descriptor this instance was constructed for.
    fn type_name(&self) -> &str;

    /// Replace the content with one entry's raw bytes.
    fn decode(&mut self, raw: &[u8]) -> Result<()>;

    /// Default-constructed instance of the same type, used as a scratch
    /// target while an entry is decoded.
    fn fresh(&self) -> Box<dyn WrappedObject>;

    /// Presence flag, `None` if the container has none.
    fn is_present(&self) -> Option<bool> {
        None
    }

    /// Unwrapped product, `None` if the container cannot unwrap.
    fn product(&self) -> Option<&dyn Product> {
        None
    }

    /// The container itself viewed as a product.
    fn as_product(&self) -> &dyn Product;
}

/// Shared handle to an object decode target.
pub type ObjectSlot = Arc<RwLock<Box<dyn WrappedObject>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_tree() {
        assert!(KeyInfo::new("Events", "TTree").is_tree());
        assert!(!KeyInfo::new("hPt", "TH1F").is_tree());
    }

    #[test]
    fn test_leaf_buffer() {
        let mut buf = LeafBuffer::new(LeafType::Short);
        assert!(buf.is_empty());
        assert_eq!(buf.get(0), None);

        buf.fill(&[1, 0, 0xFF, 0xFF]).unwrap();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get(0), Some(Value::Int(1)));
        assert_eq!(buf.get(1), Some(Value::Int(-1)));
        assert_eq!(buf.get(2), None);
        assert_eq!(buf.get(usize::MAX), None);

        assert!(buf.fill(&[1, 2, 3]).is_err());
        // failed fill keeps the previous entry
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_value_product() {
        let v = Value::from(vec![1i32, 2, 3]);
        assert_eq!(Product::len(&v), Some(3));
        assert_eq!(v.element(2), Some(Value::Int(3)));
        assert_eq!(v.element(3), None);
        assert_eq!(Product::len(&Value::Int(1)), None);
    }
}
