//! Building trees entry by entry.
//!
//! ```ignore
//! let mut events = TreeBuilder::new("Events");
//! events.add_leaf("nMuons", "nMuons/I")?;
//! events.add_object("patMuons", "edm::Wrapper<std::vector<pat::Muon> >", &registry)?;
//! events.fill(|e| {
//!     e.set("nMuons", 1);
//!     e.set("patMuons", vec![muon]);
//!     Ok(())
//! })?;
//! let data = events.build();
//! ```

use std::collections::HashMap;

use super::{BranchRecord, LeafDecl, TreeSchema};
use crate::core::{Shape, TypeDescriptor, TypeRegistry};
use crate::util::{Error, LeafSpec, LeafType, Result, Value};

/// A complete in-memory tree: schema plus per-branch, per-entry payloads.
#[derive(Clone, Debug, Default)]
pub struct TreeData {
    pub schema: TreeSchema,
    /// `payloads[branch][entry]`
    pub payloads: Vec<Vec<Vec<u8>>>,
}

impl TreeData {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn num_entries(&self) -> u64 {
        self.schema.num_entries
    }
}

enum Encoder {
    Leaf { leaf_type: LeafType, fixed_len: Option<usize> },
    Object(Shape),
    Raw,
}

/// Incremental tree builder.
pub struct TreeBuilder {
    schema: TreeSchema,
    encoders: Vec<Encoder>,
    payloads: Vec<Vec<Vec<u8>>>,
}

impl TreeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: TreeSchema { name: name.into(), ..TreeSchema::default() },
            encoders: Vec::new(),
            payloads: Vec::new(),
        }
    }

    fn push_branch(&mut self, record: BranchRecord, encoder: Encoder) -> Result<&mut Self> {
        if self.schema.num_entries > 0 {
            return Err(Error::other(format!(
                "tree '{}': cannot add branch '{}' after filling entries",
                self.schema.name, record.name
            )));
        }
        if self.schema.branch_index(&record.name).is_some() {
            return Err(Error::other(format!(
                "tree '{}' already has a branch '{}'",
                self.schema.name, record.name
            )));
        }
        self.schema.branches.push(record);
        self.encoders.push(encoder);
        self.payloads.push(Vec::new());
        Ok(self)
    }

    /// Add a scalar branch whose leaf is declared by `title` (`pt[4]/F`).
    ///
    /// The leaf name comes from the title and may differ from `branch`.
    pub fn add_leaf(&mut self, branch: &str, title: &str) -> Result<&mut Self> {
        let spec = LeafSpec::parse(title)
            .ok_or_else(|| Error::other(format!("invalid leaf title '{title}'")))?;
        let record = BranchRecord {
            name: branch.to_string(),
            class_name: String::new(),
            title: title.to_string(),
            leaf: Some(LeafDecl::new(spec.name.clone(), spec.leaf_type.name())),
        };
        let fixed_len = spec.fixed_len();
        self.push_branch(record, Encoder::Leaf { leaf_type: spec.leaf_type, fixed_len })
    }

    /// Add an object branch; `class_name` must resolve in `registry`.
    pub fn add_object(&mut self, branch: &str, class_name: &str, registry: &TypeRegistry) -> Result<&mut Self> {
        let shape = registry.shape(&TypeDescriptor::parse(class_name)?)?;
        let record = BranchRecord {
            name: branch.to_string(),
            class_name: class_name.to_string(),
            title: branch.to_string(),
            leaf: None,
        };
        self.push_branch(record, Encoder::Object(shape))
    }

    /// Add a branch with a free-form schema. Entries must be set with
    /// [`EntryBuilder::set_raw`]; unset entries are empty.
    pub fn add_raw(
        &mut self,
        branch: &str,
        class_name: &str,
        title: &str,
        leaf: Option<LeafDecl>,
    ) -> Result<&mut Self> {
        let record = BranchRecord {
            name: branch.to_string(),
            class_name: class_name.to_string(),
            title: title.to_string(),
            leaf,
        };
        self.push_branch(record, Encoder::Raw)
    }

    /// Add an alias. `title` is the storage title, e.g. `"recoMuons_muons__RECO.obj"`.
    pub fn add_alias(&mut self, alias: impl Into<String>, title: impl Into<String>) -> &mut Self {
        self.schema.aliases.push((alias.into(), title.into()));
        self
    }

    pub fn num_entries(&self) -> u64 {
        self.schema.num_entries
    }

    /// Append one entry. Branches left unset get their default payload:
    /// zeros for fixed-size leaves, empty for variable-size leaves, an absent
    /// wrapper or a default object for object branches.
    pub fn fill<F>(&mut self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut EntryBuilder) -> Result<()>,
    {
        let mut entry = EntryBuilder::default();
        f(&mut entry)?;

        if let Some(unknown) = entry.slots.keys().find(|k| self.schema.branch_index(k).is_none()) {
            return Err(Error::other(format!(
                "tree '{}' has no branch '{unknown}'",
                self.schema.name
            )));
        }

        let mut row = Vec::with_capacity(self.encoders.len());
        for (record, encoder) in self.schema.branches.iter().zip(&self.encoders) {
            let slot = entry.slots.remove(&record.name);
            let raw = encode_slot(encoder, slot).map_err(|e| Error::decode(&record.name, e.to_string()))?;
            row.push(raw);
        }
        for (column, raw) in self.payloads.iter_mut().zip(row) {
            column.push(raw);
        }
        self.schema.num_entries += 1;
        Ok(self.schema.num_entries - 1)
    }

    pub fn build(self) -> TreeData {
        TreeData { schema: self.schema, payloads: self.payloads }
    }
}

fn encode_slot(encoder: &Encoder, slot: Option<Slot>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match (encoder, slot) {
        (_, Some(Slot::Raw(raw))) => return Ok(raw),
        (Encoder::Leaf { leaf_type, fixed_len }, Some(Slot::Value(value))) => {
            let items = match value {
                Value::List(items) => items,
                scalar => vec![scalar],
            };
            if let Some(n) = fixed_len.filter(|&n| n != items.len()) {
                return Err(Error::other(format!("expected {n} elements, got {}", items.len())));
            }
            for item in &items {
                leaf_type
                    .encode(item, &mut out)
                    .ok_or_else(|| Error::other(format!("cannot store {item} as {leaf_type}")))?;
            }
        }
        // all-zero bytes are the zero value of every leaf type
        (Encoder::Leaf { leaf_type, fixed_len }, None) => {
            out.resize(fixed_len.unwrap_or(0) * leaf_type.num_bytes(), 0);
        }
        (Encoder::Object(shape), Some(Slot::Value(value))) => shape.encode(&value, &mut out)?,
        (Encoder::Object(shape @ Shape::Wrapper(_)), Some(Slot::Absent) | None) => shape.encode_absent(&mut out)?,
        (Encoder::Object(shape), None) => shape.encode(&shape.default_value(), &mut out)?,
        (Encoder::Raw, None) => {}
        (_, Some(Slot::Absent)) => return Err(Error::other("only wrapped branches can be absent")),
        (Encoder::Raw, Some(Slot::Value(_))) => return Err(Error::other("raw branches take raw bytes")),
    }
    Ok(out)
}

enum Slot {
    Value(Value),
    Absent,
    Raw(Vec<u8>),
}

/// Values of one entry being filled.
#[derive(Default)]
pub struct EntryBuilder {
    slots: HashMap<String, Slot>,
}

impl EntryBuilder {
    /// Set a branch value. Leaves take a scalar or a [`Value::List`];
    /// wrapped branches take the product and are stored present.
    pub fn set(&mut self, branch: &str, value: impl Into<Value>) -> &mut Self {
        self.slots.insert(branch.to_string(), Slot::Value(value.into()));
        self
    }

    /// Mark a wrapped branch absent for this entry.
    pub fn set_absent(&mut self, branch: &str) -> &mut Self {
        self.slots.insert(branch.to_string(), Slot::Absent);
        self
    }

    /// Store raw payload bytes as-is.
    pub fn set_raw(&mut self, branch: &str, raw: Vec<u8>) -> &mut Self {
        self.slots.insert(branch.to_string(), Slot::Raw(raw));
        self
    }
}
