//! File sessions: one storage handle, one cursor per registered tree.

use std::path::Path;
use std::sync::Arc;

use super::cursor::EntryCursor;
use super::options::SessionOptions;
use super::view::View;
use crate::core::{StorageFile, TypeRegistry};
use crate::store::StoreFile;
use crate::util::{Error, Result};

/// An open storage file with a cursor per registered tree.
pub struct FileSession {
    storage: Box<dyn StorageFile>,
    registry: Arc<TypeRegistry>,
    cursors: Vec<EntryCursor>,
}

impl FileSession {
    /// Open an EVTR file and register all of its trees.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, SessionOptions::default())
    }

    /// Open an EVTR file with options.
    pub fn open_with(path: impl AsRef<Path>, options: SessionOptions) -> Result<Self> {
        let store = StoreFile::open_opts(path, options.use_mmap)?;
        Self::from_storage(Box::new(store), options)
    }

    /// Wrap any storage engine.
    ///
    /// With explicit trees, each must be a `TTree` key of the file; without,
    /// every `TTree` key is registered in file order.
    pub fn from_storage(storage: Box<dyn StorageFile>, options: SessionOptions) -> Result<Self> {
        let mut session = Self {
            storage,
            registry: options.registry,
            cursors: Vec::new(),
        };

        match options.trees {
            Some(trees) => {
                for tree in &trees {
                    session.register_tree(tree)?;
                }
            }
            None => {
                let trees: Vec<String> = session
                    .storage
                    .keys()
                    .into_iter()
                    .filter(|key| key.is_tree())
                    .map(|key| key.name)
                    .collect();
                for tree in &trees {
                    session.register_tree(tree)?;
                }
            }
        }

        tracing::debug!("session '{}': trees {:?}", session.name(), session.tree_names());
        Ok(session)
    }

    /// Register a tree by name. Registering a tree twice does nothing.
    pub fn register_tree(&mut self, name: &str) -> Result<()> {
        if self.cursor(name).is_some() {
            return Ok(());
        }

        let key = self.storage.key(name).ok_or_else(|| Error::TreeNotFound {
            file: self.name().to_string(),
            tree: name.to_string(),
        })?;
        if !key.is_tree() {
            return Err(Error::NotATree {
                file: self.name().to_string(),
                name: name.to_string(),
                class_name: key.class_name,
            });
        }

        let tree = self.storage.tree(name)?;
        let cursor = EntryCursor::new(tree, Arc::clone(&self.registry))?;
        tracing::debug!("registered tree '{}' ({} entries)", name, cursor.entry_count());
        self.cursors.push(cursor);
        Ok(())
    }

    /// File name or path of the storage.
    pub fn name(&self) -> &str {
        self.storage.name()
    }

    /// Registered trees, in registration order.
    pub fn tree_names(&self) -> Vec<&str> {
        self.cursors.iter().map(EntryCursor::tree_name).collect()
    }

    pub fn cursor(&self, tree: &str) -> Option<&EntryCursor> {
        self.cursors.iter().find(|c| c.tree_name() == tree)
    }

    pub fn cursor_mut(&mut self, tree: &str) -> Option<&mut EntryCursor> {
        self.cursors.iter_mut().find(|c| c.tree_name() == tree)
    }

    /// View of `label` in `tree`. The tree may be omitted when exactly one
    /// tree is registered.
    pub fn product(&mut self, label: &str, tree: Option<&str>) -> Result<Arc<View>> {
        let file = self.storage.name().to_string();
        let cursor = match tree {
            Some(tree) => self.cursors.iter_mut().find(|c| c.tree_name() == tree).ok_or_else(|| {
                Error::TreeNotFound { file, tree: tree.to_string() }
            })?,
            None => match self.cursors.as_mut_slice() {
                [cursor] => cursor,
                cursors => {
                    return Err(Error::AmbiguousTree { label: label.to_string(), trees: cursors.len() })
                }
            },
        };
        cursor.product(label)
    }
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("name", &self.name())
            .field("cursors", &self.cursors)
            .finish()
    }
}
