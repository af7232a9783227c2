//! In-memory storage engine.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Bindings, EntrySource, TreeData};
use crate::core::{BranchInfo, KeyInfo, LeafSlot, ObjectSlot, StorageFile, TreeReader, TREE_CLASS};
use crate::util::{Error, Result};

/// A storage file whose trees live in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFile {
    name: String,
    keys: Vec<KeyInfo>,
    trees: HashMap<String, Arc<TreeData>>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add a tree under its own name.
    pub fn add_tree(&mut self, tree: TreeData) -> &mut Self {
        let name = tree.name().to_string();
        self.keys.push(KeyInfo::new(name.clone(), TREE_CLASS));
        self.trees.insert(name, Arc::new(tree));
        self
    }

    /// Add a non-tree key (a histogram, a directory, ...).
    pub fn add_key(&mut self, name: impl Into<String>, class_name: impl Into<String>) -> &mut Self {
        self.keys.push(KeyInfo::new(name, class_name));
        self
    }

    /// Tree payloads, in key order.
    pub fn trees(&self) -> impl Iterator<Item = &TreeData> {
        self.keys.iter().filter_map(|k| self.trees.get(&k.name)).map(Arc::as_ref)
    }
}

impl StorageFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> Vec<KeyInfo> {
        self.keys.clone()
    }

    fn tree(&self, name: &str) -> Result<Box<dyn TreeReader>> {
        match self.trees.get(name) {
            Some(data) => Ok(Box::new(MemoryTree::new(Arc::clone(data)))),
            None => match self.key(name) {
                Some(key) => Err(Error::NotATree {
                    file: self.name.clone(),
                    name: name.to_string(),
                    class_name: key.class_name,
                }),
                None => Err(Error::TreeNotFound { file: self.name.clone(), tree: name.to_string() }),
            },
        }
    }
}

/// Tree reader over shared in-memory payloads.
pub struct MemoryTree {
    data: Arc<TreeData>,
    bindings: Bindings,
}

impl MemoryTree {
    pub fn new(data: Arc<TreeData>) -> Self {
        Self { data, bindings: Bindings::default() }
    }
}

impl EntrySource for TreeData {
    fn raw(&self, branch: usize, entry: u64) -> Result<Cow<'_, [u8]>> {
        self.payloads
            .get(branch)
            .and_then(|column| column.get(entry as usize))
            .map(|raw| Cow::Borrowed(raw.as_slice()))
            .ok_or_else(|| Error::invalid(format!("no payload for branch {branch} entry {entry}")))
    }
}

impl TreeReader for MemoryTree {
    fn name(&self) -> &str {
        self.data.name()
    }

    fn num_entries(&self) -> u64 {
        self.data.num_entries()
    }

    fn branches(&self) -> Vec<BranchInfo> {
        self.data.schema.branch_infos()
    }

    fn leaf_type_name(&self, name: &str) -> Option<String> {
        self.data.schema.leaf_type_name(name)
    }

    fn branch_title(&self, name: &str) -> Option<String> {
        self.data.schema.branch_title(name)
    }

    fn aliases(&self) -> Option<Vec<(String, String)>> {
        self.data.schema.alias_table()
    }

    fn bind_leaf(&mut self, leaf: &str) -> Result<LeafSlot> {
        self.bindings
            .bind_leaf(&self.data.schema, self.data.as_ref(), leaf)
            .map(|(_, slot)| slot)
    }

    fn bind_object(&mut self, branch: &str, target: ObjectSlot) -> Result<()> {
        self.bindings
            .bind_object(&self.data.schema, self.data.as_ref(), branch, target)
            .map(|_| ())
    }

    fn load_entry(&mut self, index: u64) -> Result<()> {
        tracing::trace!(tree = self.data.name(), entry = index, "load entry");
        self.bindings.load(&self.data.schema, self.data.as_ref(), index)
    }
}
