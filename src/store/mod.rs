//! Storage engines implementing [`StorageFile`](crate::core::StorageFile).
//!
//! - [`memory`] - trees held in memory, built with [`TreeBuilder`]
//! - [`file`] - the EVTR binary container, memory-mapped on read
//!
//! Both engines share the schema model ([`TreeSchema`]) and the binding
//! bookkeeping: loading an entry touches only bound branches.

use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{BranchInfo, LeafBuffer, LeafSlot, ObjectSlot, WrappedObject};
use crate::util::{Error, LeafType, Result};

mod builder;
pub mod memory;
pub mod file;

pub use builder::{EntryBuilder, TreeBuilder, TreeData};
pub use memory::{MemoryFile, MemoryTree};
pub use file::{StoreFile, StoreWriter};

/// Leaf declared by a scalar branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafDecl {
    pub name: String,
    pub type_name: String,
}

impl LeafDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// Schema of one branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchRecord {
    pub name: String,
    /// Empty for plain leaf branches.
    pub class_name: String,
    pub title: String,
    pub leaf: Option<LeafDecl>,
}

impl BranchRecord {
    pub fn is_leaf(&self) -> bool {
        self.class_name.is_empty()
    }
}

/// Schema of one tree: everything but the entry payloads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeSchema {
    pub name: String,
    pub num_entries: u64,
    pub branches: Vec<BranchRecord>,
    pub aliases: Vec<(String, String)>,
}

impl TreeSchema {
    pub fn branch_index(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }

    /// Branch holding the leaf called `leaf`.
    pub fn leaf_branch(&self, leaf: &str) -> Option<(usize, &LeafDecl)> {
        self.branches
            .iter()
            .enumerate()
            .find_map(|(i, b)| b.leaf.as_ref().filter(|l| l.name == leaf).map(|l| (i, l)))
    }

    pub fn branch_infos(&self) -> Vec<BranchInfo> {
        self.branches
            .iter()
            .map(|b| BranchInfo { name: b.name.clone(), class_name: b.class_name.clone() })
            .collect()
    }

    pub fn leaf_type_name(&self, name: &str) -> Option<String> {
        self.leaf_branch(name).map(|(_, l)| l.type_name.clone())
    }

    pub fn branch_title(&self, name: &str) -> Option<String> {
        self.branch_index(name).map(|i| self.branches[i].title.clone())
    }

    pub fn alias_table(&self) -> Option<Vec<(String, String)>> {
        (!self.aliases.is_empty()).then(|| self.aliases.clone())
    }
}

/// Raw per-entry payloads of a tree's branches.
pub(crate) trait EntrySource {
    fn raw(&self, branch: usize, entry: u64) -> Result<Cow<'_, [u8]>>;
}

/// Decode targets registered with a tree, in binding order.
#[derive(Default)]
pub(crate) struct Bindings {
    leaves: Vec<(usize, LeafSlot)>,
    objects: Vec<(usize, ObjectSlot)>,
    loaded: Option<u64>,
}

impl Bindings {
    /// Bind (or re-use) the slot of a leaf. Returns the branch index.
    pub fn bind_leaf(
        &mut self,
        schema: &TreeSchema,
        source: &dyn EntrySource,
        leaf: &str,
    ) -> Result<(usize, LeafSlot)> {
        let (index, decl) = schema.leaf_branch(leaf).ok_or_else(|| Error::LeafNotFound {
            tree: schema.name.clone(),
            branch: leaf.to_string(),
            leaf: leaf.to_string(),
        })?;
        if let Some((_, slot)) = self.leaves.iter().find(|(i, _)| *i == index) {
            return Ok((index, LeafSlot::clone(slot)));
        }
        let leaf_type = LeafType::from_name(&decl.type_name)
            .ok_or_else(|| Error::UnresolvedType(decl.type_name.clone()))?;
        let buffer = match self.loaded {
            Some(entry) => read_leaf(schema, source, index, leaf_type, entry)?,
            None => LeafBuffer::new(leaf_type),
        };
        let slot = Arc::new(RwLock::new(buffer));
        self.leaves.push((index, LeafSlot::clone(&slot)));
        Ok((index, slot))
    }

    /// Bind an object target, replacing any earlier target of the branch.
    pub fn bind_object(
        &mut self,
        schema: &TreeSchema,
        source: &dyn EntrySource,
        branch: &str,
        target: ObjectSlot,
    ) -> Result<usize> {
        let index = schema
            .branch_index(branch)
            .filter(|&i| !schema.branches[i].is_leaf())
            .ok_or_else(|| Error::ProductNotFound {
                label: branch.to_string(),
                tree: schema.name.clone(),
            })?;
        if let Some(entry) = self.loaded {
            let object = read_object(schema, source, index, &**target.read(), entry)?;
            *target.write() = object;
        }
        self.objects.retain(|(i, _)| *i != index);
        self.objects.push((index, target));
        Ok(index)
    }

    /// Decode entry `entry` into every bound target.
    ///
    /// Every branch is decoded into a scratch target first; the slots are
    /// only swapped once all of them succeeded.
    pub fn load(&mut self, schema: &TreeSchema, source: &dyn EntrySource, entry: u64) -> Result<()> {
        if entry >= schema.num_entries {
            return Err(Error::EntryOutOfRange {
                tree: schema.name.clone(),
                index: entry,
                count: schema.num_entries,
            });
        }
        let leaves = self
            .leaves
            .iter()
            .map(|(i, slot)| {
                let leaf_type = slot.read().leaf_type();
                read_leaf(schema, source, *i, leaf_type, entry)
            })
            .collect::<Result<Vec<_>>>()?;
        let objects = self
            .objects
            .iter()
            .map(|(i, slot)| read_object(schema, source, *i, &**slot.read(), entry))
            .collect::<Result<Vec<_>>>()?;

        for ((_, slot), buffer) in self.leaves.iter().zip(leaves) {
            *slot.write() = buffer;
        }
        for ((_, slot), object) in self.objects.iter().zip(objects) {
            *slot.write() = object;
        }
        self.loaded = Some(entry);
        Ok(())
    }
}

fn read_leaf(
    schema: &TreeSchema,
    source: &dyn EntrySource,
    branch: usize,
    leaf_type: LeafType,
    entry: u64,
) -> Result<LeafBuffer> {
    let raw = source.raw(branch, entry)?;
    let mut buffer = LeafBuffer::new(leaf_type);
    buffer
        .fill(&raw)
        .map_err(|e| Error::decode(&schema.branches[branch].name, e.to_string()))?;
    Ok(buffer)
}

fn read_object(
    schema: &TreeSchema,
    source: &dyn EntrySource,
    branch: usize,
    template: &dyn WrappedObject,
    entry: u64,
) -> Result<Box<dyn WrappedObject>> {
    let raw = source.raw(branch, entry)?;
    let mut object = template.fresh();
    object
        .decode(&raw)
        .map_err(|e| Error::decode(&schema.branches[branch].name, e.to_string()))?;
    Ok(object)
}
