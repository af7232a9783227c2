//! Type registry: turns a [`TypeDescriptor`] into a decode-target factory.
//!
//! Resolution never evaluates class strings. A descriptor resolves, in order:
//!
//! 1. to an explicitly registered factory (keyed by canonical spelling),
//! 2. structurally, from its parts:
//!    - `edm::Wrapper<T>` - presence-flagged container around `T`
//!    - `std::vector<T>` / `vector<T>` - length-prefixed sequence
//!    - `std::string` / `string` / `TString` - text
//!    - C++ builtins and leaf type names (`int`, `float`, `Double_t`, ...)
//!    - records registered with [`TypeRegistry::register_record`]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::descriptor::TypeDescriptor;
use super::shape::{RecordLayout, Shape, ShapedObject};
use super::traits::WrappedObject;
use crate::util::{Error, LeafType, Result};

/// Constructs fresh decode targets for one type.
pub type Factory = Arc<dyn Fn() -> Box<dyn WrappedObject> + Send + Sync>;

const WRAPPER_NAMES: &[&str] = &["edm::Wrapper"];
const VECTOR_NAMES: &[&str] = &["std::vector", "vector"];
const TEXT_NAMES: &[&str] = &["std::string", "string", "TString"];

/// Registry of wrapped-object types.
///
/// Populate it up front, then share it as `Arc<TypeRegistry>` through
/// [`SessionOptions`](crate::tree::SessionOptions).
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, Factory>,
    records: HashMap<String, Arc<RecordLayout>>,
}

impl TypeRegistry {
    /// Create a registry with only structural resolution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an exact class string.
    pub fn register_factory<F>(&mut self, class_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn WrappedObject> + Send + Sync + 'static,
    {
        let key = TypeDescriptor::parse(class_name)?.canonical();
        self.factories.insert(key, Arc::new(factory));
        Ok(())
    }

    /// Register an aggregate type from `(field name, field class string)`
    /// pairs. Field types must already be resolvable.
    pub fn register_record<N, T>(
        &mut self,
        class_name: &str,
        fields: impl IntoIterator<Item = (N, T)>,
    ) -> Result<()>
    where
        N: Into<String>,
        T: AsRef<str>,
    {
        let desc = TypeDescriptor::parse(class_name)?;
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Ok((name.into(), self.shape(&TypeDescriptor::parse(ty.as_ref())?)?)))
            .collect::<Result<Vec<_>>>()?;
        let name = desc.canonical();
        self.records.insert(name.clone(), Arc::new(RecordLayout { name, fields }));
        Ok(())
    }

    /// Resolve the binary layout of a type.
    pub fn shape(&self, desc: &TypeDescriptor) -> Result<Shape> {
        if let Some(layout) = self.records.get(&desc.canonical()) {
            return Ok(Shape::Record(Arc::clone(layout)));
        }
        let args = desc.args();
        let unresolved = || Error::UnresolvedType(desc.canonical());
        if desc.is(WRAPPER_NAMES) {
            let [inner] = args else { return Err(unresolved()) };
            return Ok(Shape::Wrapper(Box::new(self.shape(inner)?)));
        }
        if desc.is(VECTOR_NAMES) {
            // second argument is the allocator
            let elem = args.first().filter(|_| args.len() <= 2).ok_or_else(unresolved)?;
            return Ok(Shape::Vector(Box::new(self.shape(elem)?)));
        }
        if desc.is_template() {
            return Err(unresolved());
        }
        if desc.is(TEXT_NAMES) {
            return Ok(Shape::Text);
        }
        LeafType::from_cpp_name(&desc.name()).map(Shape::Leaf).ok_or_else(unresolved)
    }

    /// Resolve a factory for a type.
    pub fn resolve(&self, desc: &TypeDescriptor) -> Result<Factory> {
        let key = desc.canonical();
        if let Some(factory) = self.factories.get(&key) {
            return Ok(Arc::clone(factory));
        }
        let shape = self.shape(desc)?;
        Ok(Arc::new(move || Box::new(ShapedObject::new(key.clone(), shape.clone())) as Box<dyn WrappedObject>))
    }

    /// Construct a fresh decode target for a type.
    pub fn construct(&self, desc: &TypeDescriptor) -> Result<Box<dyn WrappedObject>> {
        Ok((self.resolve(desc)?)())
    }

    /// Check whether a type resolves.
    pub fn is_resolvable(&self, desc: &TypeDescriptor) -> bool {
        self.factories.contains_key(&desc.canonical()) || self.shape(desc).is_ok()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut factories: Vec<_> = self.factories.keys().collect();
        factories.sort();
        let mut records: Vec<_> = self.records.keys().collect();
        records.sort();
        f.debug_struct("TypeRegistry")
            .field("factories", &factories)
            .field("records", &records)
            .finish()
    }
}
