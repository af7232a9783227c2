//! Entry cursor: iteration over one tree and on-demand product binding.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::catalog::{BranchCatalog, ProductKind};
use super::view::{ProductView, View, WrapperView};
use crate::core::{TreeReader, TypeRegistry};
use crate::util::{Error, Result};

#[derive(Clone, Copy, Debug, Default)]
struct Position {
    current: Option<u64>,
    initialized: bool,
}

/// Cursor position shared with the cursor's views.
#[derive(Clone, Debug)]
pub(crate) struct SharedState {
    tree: Arc<str>,
    position: Arc<RwLock<Position>>,
}

impl SharedState {
    fn new(tree: &str) -> Self {
        Self { tree: Arc::from(tree), position: Arc::default() }
    }

    pub fn tree(&self) -> &str {
        &self.tree
    }

    pub fn is_initialized(&self) -> bool {
        self.position.read().initialized
    }

    pub fn current(&self) -> Option<u64> {
        self.position.read().current
    }

    /// Current entry, or `NotInitialized` before the first load.
    pub fn ensure_ready(&self) -> Result<u64> {
        let position = *self.position.read();
        match position.current {
            Some(entry) if position.initialized => Ok(entry),
            _ => Err(Error::NotInitialized { tree: self.tree.to_string() }),
        }
    }

    fn set(&self, entry: u64) {
        *self.position.write() = Position { current: Some(entry), initialized: true };
    }
}

/// Iteration driver over one tree.
///
/// Products are bound on first request and stay active for the life of the
/// cursor; every load refreshes them in the order they were requested.
pub struct EntryCursor {
    tree: Box<dyn TreeReader>,
    entry_count: u64,
    catalog: BranchCatalog,
    registry: Arc<TypeRegistry>,
    state: SharedState,
    active: Vec<(String, Arc<View>)>,
}

impl EntryCursor {
    /// Wrap a tree handle, cataloguing its branches.
    pub fn new(tree: Box<dyn TreeReader>, registry: Arc<TypeRegistry>) -> Result<Self> {
        let catalog = BranchCatalog::build(tree.as_ref())?;
        let state = SharedState::new(tree.name());
        Ok(Self {
            entry_count: tree.num_entries(),
            tree,
            catalog,
            registry,
            state,
            active: Vec::new(),
        })
    }

    pub fn tree_name(&self) -> &str {
        self.state.tree()
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Index of the loaded entry, `None` before the first load.
    pub fn current_index(&self) -> Option<u64> {
        self.state.current()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn catalog(&self) -> &BranchCatalog {
        &self.catalog
    }

    /// Canonical names of the active products, in binding order.
    pub fn active_labels(&self) -> Vec<&str> {
        self.active.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Load the next entry. `Ok(None)` once the last entry is loaded;
    /// the position does not move then.
    pub fn advance(&mut self) -> Result<Option<u64>> {
        let next = self.state.current().map_or(0, |i| i + 1);
        if next >= self.entry_count {
            return Ok(None);
        }
        self.load(next)?;
        Ok(Some(next))
    }

    /// Iterate the remaining entries.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries { cursor: self, done: false }
    }

    /// Load entry `index`.
    pub fn seek(&mut self, index: u64) -> Result<()> {
        if index >= self.entry_count {
            return Err(Error::EntryOutOfRange {
                tree: self.tree_name().to_string(),
                index,
                count: self.entry_count,
            });
        }
        self.load(index)
    }

    fn load(&mut self, index: u64) -> Result<()> {
        self.tree.load_entry(index)?;
        self.state.set(index);
        tracing::trace!("'{}' at entry {}", self.state.tree(), index);
        for (_, view) in &self.active {
            view.refresh()?;
        }
        Ok(())
    }

    /// View of the product called `label`: an alias, a branch name or a
    /// leaf name. Requesting the same product twice returns the same view.
    pub fn product(&mut self, label: &str) -> Result<Arc<View>> {
        let canonical = self
            .catalog
            .resolve(label)
            .ok_or_else(|| Error::ProductNotFound {
                label: label.to_string(),
                tree: self.tree_name().to_string(),
            })?
            .to_string();

        if let Some((_, view)) = self.active.iter().find(|(name, _)| *name == canonical) {
            return Ok(Arc::clone(view));
        }

        let branch_type = self
            .catalog
            .branch_type(&canonical)
            .ok_or_else(|| Error::ProductNotFound {
                label: label.to_string(),
                tree: self.tree_name().to_string(),
            })?;
        let state = self.state.clone();
        let view: View = match branch_type.product_kind() {
            ProductKind::Leaf(leaf_type) => {
                ProductView::bind(self.tree.as_mut(), &canonical, leaf_type, state)?.into()
            }
            ProductKind::Wrapped => {
                let descriptor = branch_type.descriptor()?;
                WrapperView::bind(self.tree.as_mut(), &canonical, &descriptor, &self.registry, state)?.into()
            }
        };

        let view = Arc::new(view);
        self.active.push((canonical, Arc::clone(&view)));
        Ok(view)
    }

    /// Canonical names containing `pattern`, ignoring case.
    pub fn find_collection(&self, pattern: &str) -> Vec<String> {
        self.catalog.find(pattern)
    }
}

impl fmt::Display for EntryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Entries: {}", self.tree_name(), self.entry_count)?;
        write!(f, "{}", self.catalog)
    }
}

impl fmt::Debug for EntryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCursor")
            .field("tree", &self.tree_name())
            .field("entry_count", &self.entry_count)
            .field("current", &self.state.current())
            .field("active", &self.active_labels())
            .finish()
    }
}

/// Forward-only iterator over a cursor's entries.
///
/// Stops after the first error.
pub struct Entries<'a> {
    cursor: &'a mut EntryCursor,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.advance() {
            Ok(Some(index)) => Some(Ok(index)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StorageFile;
    use crate::store::{MemoryFile, TreeBuilder};
    use crate::util::Value;

    fn cursor() -> EntryCursor {
        let mut b = TreeBuilder::new("Events");
        b.add_leaf("nMuons", "nMuons/I").unwrap();
        b.add_leaf("foo", "bar[4]/F").unwrap();
        for i in 0..3 {
            b.fill(|e| {
                e.set("nMuons", i).set("foo", vec![i as f32; 4]);
                Ok(())
            })
            .unwrap();
        }
        let mut file = MemoryFile::new("mem");
        file.add_tree(b.build());
        EntryCursor::new(file.tree("Events").unwrap(), Arc::default()).unwrap()
    }

    #[test]
    fn test_advance_to_end() {
        let mut c = cursor();
        assert_eq!(c.current_index(), None);
        assert!(!c.is_initialized());
        for k in 1..=3u64 {
            assert_eq!(c.advance().unwrap(), Some(k - 1));
            assert_eq!(c.current_index(), Some(k - 1));
        }
        assert_eq!(c.advance().unwrap(), None);
        assert_eq!(c.advance().unwrap(), None);
        assert_eq!(c.current_index(), Some(2));
    }

    #[test]
    fn test_entries_iterator() {
        let mut c = cursor();
        c.seek(1).unwrap();
        let rest: Vec<u64> = c.entries().collect::<Result<_>>().unwrap();
        assert_eq!(rest, vec![2]);
        assert_eq!(c.entries().count(), 0);
    }

    #[test]
    fn test_seek_bounds() {
        let mut c = cursor();
        assert!(matches!(c.seek(3), Err(Error::EntryOutOfRange { index: 3, count: 3, .. })));
        assert!(!c.is_initialized());
        c.seek(2).unwrap();
        assert!(c.is_initialized());
        assert_eq!(c.current_index(), Some(2));
    }

    #[test]
    fn test_product_is_bound_once() {
        let mut c = cursor();
        let a = c.product("nMuons").unwrap();
        let b = c.product("nMuons").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // branch name and leaf name reach the same binding
        let foo = c.product("foo").unwrap();
        let bar = c.product("bar").unwrap();
        assert!(Arc::ptr_eq(&foo, &bar));
        assert_eq!(c.active_labels(), vec!["nMuons", "bar"]);
        assert!(matches!(c.product("nope"), Err(Error::ProductNotFound { .. })));
    }

    #[test]
    fn test_not_initialized_is_repeatable() {
        let mut c = cursor();
        let n = c.product("nMuons").unwrap();
        for _ in 0..3 {
            assert!(matches!(n.element_at(0), Err(Error::NotInitialized { .. })));
            assert!(matches!(n.len(), Err(Error::NotInitialized { .. })));
            assert!(Arc::ptr_eq(&n, &c.product("nMuons").unwrap()));
        }
        c.advance().unwrap();
        assert_eq!(n.element_at(0).unwrap(), Some(Value::Int(0)));
    }

    #[test]
    fn test_late_binding_sees_loaded_entry() {
        let mut c = cursor();
        c.seek(2).unwrap();
        let bar = c.product("bar").unwrap();
        assert_eq!(bar.len().unwrap(), 4);
        assert_eq!(bar.element_at(3).unwrap(), Some(Value::Float(2.0)));
        assert_eq!(bar.element_at(4).unwrap(), None);
    }

    #[test]
    fn test_late_binding_failure_registers_nothing() {
        let mut b = TreeBuilder::new("Events");
        b.add_leaf("n", "n/I").unwrap();
        b.add_raw("w", "edm::Wrapper<float>", "w", None).unwrap();
        for (n, w) in [(5, vec![1, 0]), (6, vec![1, 0, 0, 0x80, 0x3F])] {
            b.fill(|e| {
                e.set("n", n).set_raw("w", w);
                Ok(())
            })
            .unwrap();
        }
        let mut file = MemoryFile::new("mem");
        file.add_tree(b.build());
        let mut c = EntryCursor::new(file.tree("Events").unwrap(), Arc::default()).unwrap();

        let n = c.product("n").unwrap();
        c.seek(0).unwrap();
        assert!(matches!(c.product("w"), Err(Error::Decode { .. })));
        assert_eq!(c.active_labels(), vec!["n"]);
        assert_eq!(n.element_at(0).unwrap(), Some(Value::Int(5)));

        c.advance().unwrap();
        let w = c.product("w").unwrap();
        assert_eq!(w.value().unwrap(), Value::Float(1.0));
        assert_eq!(c.active_labels(), vec!["n", "w"]);
    }

    #[test]
    fn test_display() {
        let c = cursor();
        assert_eq!(c.to_string(), "Events Entries: 3\n-- bar (Float_t)\n-- nMuons (Int_t)\n");
        assert_eq!(c.find_collection("MUON"), vec!["nMuons".to_string()]);
    }
}
