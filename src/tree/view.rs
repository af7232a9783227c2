//! Product views: windows onto the decode targets of one branch.
//!
//! A view shows whatever entry its cursor loaded last. Values are decoded
//! on access; callers wanting a snapshot copy them out before advancing.

use std::sync::Arc;

use parking_lot::Mutex;

use super::cursor::SharedState;
use crate::core::{
    LeafSlot, ObjectSlot, Product, TreeReader, TypeDescriptor, TypeRegistry, WrappedObject,
};
use crate::util::{LeafType, Result, Value};

/// View over a primitive leaf.
pub struct ProductView {
    label: String,
    leaf_type: LeafType,
    slot: LeafSlot,
    state: SharedState,
}

impl ProductView {
    /// Bind the leaf called `label`.
    pub(crate) fn bind(
        tree: &mut dyn TreeReader,
        label: &str,
        leaf_type: LeafType,
        state: SharedState,
    ) -> Result<Self> {
        let slot = tree.bind_leaf(label)?;
        tracing::debug!("bound leaf '{}' ({}) of '{}'", label, leaf_type, tree.name());
        Ok(Self { label: label.to_string(), leaf_type, slot, state })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn leaf_type(&self) -> LeafType {
        self.leaf_type
    }

    /// Element count of the current entry.
    pub fn len(&self) -> Result<usize> {
        self.state.ensure_ready()?;
        Ok(self.slot.read().len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element `index` of the current entry, `None` past the end.
    pub fn element_at(&self, index: usize) -> Result<Option<Value>> {
        self.state.ensure_ready()?;
        Ok(self.slot.read().get(index))
    }

    /// All elements of the current entry.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.state.ensure_ready()?;
        Ok(self.slot.read().values())
    }

    /// The current entry's value: the element itself for single-element
    /// leaves, a list otherwise.
    pub fn value(&self) -> Result<Value> {
        let mut values = self.values()?;
        Ok(if values.len() == 1 { values.remove(0) } else { Value::List(values) })
    }
}

#[derive(Default)]
struct Extracted {
    /// Entry the product was last extracted at.
    token: Option<u64>,
    size: Option<usize>,
    present: Option<bool>,
}

/// View over a branch decoded into a [`WrappedObject`].
///
/// The product is extracted at most once per entry: unwrapped when the
/// object can unwrap, otherwise the object itself.
pub struct WrapperView {
    label: String,
    type_name: String,
    object: ObjectSlot,
    state: SharedState,
    extracted: Mutex<Extracted>,
}

impl WrapperView {
    /// Construct a fresh decode target for `descriptor` and bind it to the
    /// branch `label`.
    pub(crate) fn bind(
        tree: &mut dyn TreeReader,
        label: &str,
        descriptor: &TypeDescriptor,
        registry: &TypeRegistry,
        state: SharedState,
    ) -> Result<Self> {
        let object: Box<dyn WrappedObject> = registry.construct(descriptor)?;
        let type_name = object.type_name().to_string();
        let object = Arc::new(parking_lot::RwLock::new(object));
        tree.bind_object(label, Arc::clone(&object))?;
        tracing::debug!("bound object '{}' ({}) of '{}'", label, type_name, tree.name());
        Ok(Self {
            label: label.to_string(),
            type_name,
            object,
            state,
            extracted: Mutex::new(Extracted::default()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Extract the product of the current entry unless already done.
    pub fn refresh(&self) -> Result<()> {
        let entry = self.state.ensure_ready()?;
        let mut extracted = self.extracted.lock();
        if extracted.token == Some(entry) {
            return Ok(());
        }

        let object = self.object.read();
        let (size, present) = match object.product() {
            Some(product) => (product.len(), object.is_present()),
            None => (object.as_product().len(), None),
        };
        if present == Some(false) {
            tracing::warn!(
                "'{}' collection not present in entry {} of '{}'",
                self.label,
                entry,
                self.state.tree()
            );
        }

        *extracted = Extracted { token: Some(entry), size, present };
        Ok(())
    }

    /// Element count of the product; 0 before the first load and for
    /// products that are not sequences.
    pub fn len(&self) -> Result<usize> {
        if !self.state.is_initialized() {
            return Ok(0);
        }
        self.refresh()?;
        Ok(self.extracted.lock().size.unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element `index` of the product, `None` past the end or when the
    /// product is not a sequence.
    pub fn element_at(&self, index: usize) -> Result<Option<Value>> {
        self.refresh()?;
        match self.extracted.lock().size {
            Some(size) if index < size => {}
            _ => return Ok(None),
        }
        Ok(self.with_product(|p| p.element(index)))
    }

    /// Copy of the whole product.
    pub fn value(&self) -> Result<Value> {
        self.refresh()?;
        Ok(self.with_product(|p| p.value()))
    }

    /// Presence reported at the last extraction, `None` when the object has
    /// no presence flag or nothing was extracted yet.
    pub fn is_present(&self) -> Option<bool> {
        self.extracted.lock().present
    }

    fn with_product<R>(&self, f: impl FnOnce(&dyn Product) -> R) -> R {
        let object = self.object.read();
        match object.product() {
            Some(product) => f(product),
            None => f(object.as_product()),
        }
    }
}

/// A product view, chosen by the declared type of the branch.
pub enum View {
    Leaf(ProductView),
    Wrapped(WrapperView),
}

impl View {
    pub fn label(&self) -> &str {
        match self {
            Self::Leaf(v) => v.label(),
            Self::Wrapped(v) => v.label(),
        }
    }

    pub fn len(&self) -> Result<usize> {
        match self {
            Self::Leaf(v) => v.len(),
            Self::Wrapped(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn element_at(&self, index: usize) -> Result<Option<Value>> {
        match self {
            Self::Leaf(v) => v.element_at(index),
            Self::Wrapped(v) => v.element_at(index),
        }
    }

    pub fn value(&self) -> Result<Value> {
        match self {
            Self::Leaf(v) => v.value(),
            Self::Wrapped(v) => v.value(),
        }
    }

    /// Leaves have nothing to extract.
    pub fn refresh(&self) -> Result<()> {
        match self {
            Self::Leaf(_) => Ok(()),
            Self::Wrapped(v) => v.refresh(),
        }
    }

    pub fn is_present(&self) -> Option<bool> {
        match self {
            Self::Leaf(_) => None,
            Self::Wrapped(v) => v.is_present(),
        }
    }

    pub fn as_leaf(&self) -> Option<&ProductView> {
        match self {
            Self::Leaf(v) => Some(v),
            Self::Wrapped(_) => None,
        }
    }

    pub fn as_wrapped(&self) -> Option<&WrapperView> {
        match self {
            Self::Wrapped(v) => Some(v),
            Self::Leaf(_) => None,
        }
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(v) => f.debug_tuple("Leaf").field(&v.label).field(&v.leaf_type).finish(),
            Self::Wrapped(v) => f.debug_tuple("Wrapped").field(&v.label).field(&v.type_name).finish(),
        }
    }
}

impl From<ProductView> for View {
    fn from(view: ProductView) -> Self {
        Self::Leaf(view)
    }
}

impl From<WrapperView> for View {
    fn from(view: WrapperView) -> Self {
        Self::Wrapped(view)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::StorageFile;
    use crate::store::{MemoryFile, TreeBuilder};
    use crate::tree::EntryCursor;
    use crate::util::Error;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.register_record("pat::Muon", [("pt", "float"), ("charge", "int")]).unwrap();
        reg
    }

    fn muon(pt: f32, charge: i32) -> Value {
        Value::record([("pt", Value::from(pt)), ("charge", Value::from(charge))])
    }

    fn cursor(reg: TypeRegistry, build: impl FnOnce(&mut TreeBuilder, &TypeRegistry)) -> EntryCursor {
        let mut b = TreeBuilder::new("Events");
        build(&mut b, &reg);
        let mut file = MemoryFile::new("mem");
        file.add_tree(b.build());
        EntryCursor::new(file.tree("Events").unwrap(), Arc::new(reg)).unwrap()
    }

    #[test]
    fn test_absent_wrapper_is_empty() {
        let mut c = cursor(registry(), |b, reg| {
            b.add_object("patMuons", "edm::Wrapper<std::vector<pat::Muon>>", reg).unwrap();
            b.fill(|e| {
                e.set("patMuons", vec![muon(25.0, -1)]);
                Ok(())
            })
            .unwrap();
            b.fill(|e| {
                e.set_absent("patMuons");
                Ok(())
            })
            .unwrap();
        });
        let view = c.product("patMuons").unwrap();
        assert!(view.as_wrapped().is_some());

        // unready: zero length, but no element access
        assert_eq!(view.len().unwrap(), 0);
        assert!(matches!(view.element_at(0), Err(Error::NotInitialized { .. })));
        assert_eq!(view.is_present(), None);

        c.advance().unwrap();
        assert_eq!(view.len().unwrap(), 1);
        assert_eq!(view.is_present(), Some(true));
        assert_eq!(view.element_at(0).unwrap(), Some(muon(25.0, -1)));

        c.advance().unwrap();
        assert_eq!(view.len().unwrap(), 0);
        assert_eq!(view.is_present(), Some(false));
        assert_eq!(view.element_at(0).unwrap(), None);
    }

    #[test]
    fn test_unwrapped_sequence_is_own_product() {
        let mut c = cursor(registry(), |b, reg| {
            b.add_object("ids", "std::vector<int>", reg).unwrap();
            b.fill(|e| {
                e.set("ids", vec![4, 5, 6]);
                Ok(())
            })
            .unwrap();
        });
        let view = c.product("ids").unwrap();
        c.advance().unwrap();
        assert_eq!(view.len().unwrap(), 3);
        assert_eq!(view.element_at(2).unwrap(), Some(Value::Int(6)));
        assert_eq!(view.is_present(), None);
    }

    #[test]
    fn test_record_is_not_a_sequence() {
        let mut c = cursor(registry(), |b, reg| {
            b.add_object("leading", "pat::Muon", reg).unwrap();
            b.fill(|e| {
                e.set("leading", muon(40.0, 1));
                Ok(())
            })
            .unwrap();
        });
        let view = c.product("leading").unwrap();
        c.advance().unwrap();
        assert_eq!(view.len().unwrap(), 0);
        assert_eq!(view.element_at(0).unwrap(), None);
        assert_eq!(view.value().unwrap().field("pt"), Some(&Value::Float(40.0)));
    }

    struct Counting {
        extractions: Arc<AtomicUsize>,
        value: Value,
    }

    impl WrappedObject for Counting {
        fn type_name(&self) -> &str {
            "test::Counting"
        }

        fn decode(&mut self, raw: &[u8]) -> Result<()> {
            self.value = Value::List(raw.iter().map(|&b| Value::from(b as u32)).collect());
            Ok(())
        }

        fn fresh(&self) -> Box<dyn WrappedObject> {
            Box::new(Counting {
                extractions: Arc::clone(&self.extractions),
                value: Value::List(Vec::new()),
            })
        }

        fn is_present(&self) -> Option<bool> {
            Some(true)
        }

        fn product(&self) -> Option<&dyn Product> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            Some(&self.value)
        }

        fn as_product(&self) -> &dyn Product {
            &self.value
        }
    }

    #[test]
    fn test_one_extraction_per_entry() {
        let extractions = Arc::new(AtomicUsize::new(0));
        let mut reg = TypeRegistry::new();
        let counter = Arc::clone(&extractions);
        reg.register_factory("test::Counting", move || {
            Box::new(Counting { extractions: Arc::clone(&counter), value: Value::List(Vec::new()) })
                as Box<dyn WrappedObject>
        })
        .unwrap();

        let mut c = cursor(reg, |b, _| {
            b.add_raw("counted", "test::Counting", "counted", None).unwrap();
            for n in 1..=3u8 {
                b.fill(|e| {
                    e.set_raw("counted", vec![n; n as usize]);
                    Ok(())
                })
                .unwrap();
            }
        });
        let view = c.product("counted").unwrap();

        for k in 1..=3 {
            c.advance().unwrap();
            for _ in 0..4 {
                assert_eq!(view.len().unwrap(), k);
            }
            assert_eq!(extractions.load(Ordering::SeqCst), k);
        }
    }

    #[test]
    fn test_leaf_view_value() {
        let mut c = cursor(TypeRegistry::new(), |b, _| {
            b.add_leaf("n", "n/I").unwrap();
            b.add_leaf("pt", "pt[2]/D").unwrap();
            b.fill(|e| {
                e.set("n", 3).set("pt", vec![1.5, 2.5]);
                Ok(())
            })
            .unwrap();
        });
        let n = c.product("n").unwrap();
        let pt = c.product("pt").unwrap();
        assert!(matches!(pt.value(), Err(Error::NotInitialized { .. })));
        c.seek(0).unwrap();
        assert_eq!(n.value().unwrap(), Value::Int(3));
        assert_eq!(pt.value().unwrap(), Value::List(vec![Value::Float(1.5), Value::Float(2.5)]));
        assert_eq!(pt.as_leaf().map(ProductView::leaf_type), Some(LeafType::Double));
        assert_eq!(n.is_present(), None);
    }
}
