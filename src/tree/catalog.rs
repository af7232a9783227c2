//! Branch catalog: what a tree holds, and under which names.
//!
//! Built once per cursor. Scalar branches whose leaf is named differently
//! from the branch (`foo` holding leaf `bar` declared by the title
//! `bar[4]/F`) are listed under the leaf name, and requests for the branch
//! name are redirected to it.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::{TreeReader, TypeDescriptor};
use crate::util::{leaf_name_from_title, Error, LeafType, Result};

/// Storage token appended to alias titles.
const ALIAS_SUFFIX: &str = "obj";

/// Declared type of a catalogued branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchType {
    /// Plain leaf, with the leaf's type name (`Int_t`, `Float_t`, ...).
    Leaf { type_name: String },
    /// Object branch, with its class string and the parsed descriptor.
    Object { class_name: String, descriptor: TypeDescriptor },
}

/// How a branch is viewed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductKind {
    /// Primitive leaf read element by element.
    Leaf(LeafType),
    /// Anything else, decoded into a wrapped object.
    Wrapped,
}

impl BranchType {
    /// Leaves of a primitive type are read directly; everything else goes
    /// through the type registry.
    pub fn product_kind(&self) -> ProductKind {
        match self {
            Self::Leaf { type_name } => LeafType::from_name(type_name)
                .map(ProductKind::Leaf)
                .unwrap_or(ProductKind::Wrapped),
            Self::Object { .. } => ProductKind::Wrapped,
        }
    }

    /// Descriptor used to construct a wrapped decode target.
    pub fn descriptor(&self) -> Result<TypeDescriptor> {
        match self {
            Self::Leaf { type_name } => TypeDescriptor::parse(type_name),
            Self::Object { descriptor, .. } => Ok(descriptor.clone()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf { type_name } => f.write_str(type_name),
            Self::Object { descriptor, .. } => write!(f, "{descriptor}"),
        }
    }
}

/// Schema and name resolution of one tree.
#[derive(Clone, Debug, Default)]
pub struct BranchCatalog {
    tree: String,
    types: BTreeMap<String, BranchType>,
    aliases: Option<BTreeMap<String, String>>,
    mismatches: Option<BTreeMap<String, String>>,
}

impl BranchCatalog {
    /// Inspect every branch of `tree`.
    ///
    /// Fails if a scalar branch's leaf is found neither under the branch
    /// name nor under the name derived from its title, or if a class string
    /// does not parse.
    #[tracing::instrument(skip_all, fields(tree = tree.name()))]
    pub fn build(tree: &dyn TreeReader) -> Result<Self> {
        let tree_name = tree.name().to_string();
        let mut types = BTreeMap::new();
        let mut mismatches = BTreeMap::new();

        for branch in tree.branches() {
            if !branch.is_leaf() {
                let descriptor = TypeDescriptor::parse(&branch.class_name)?;
                types.insert(
                    branch.name,
                    BranchType::Object { class_name: branch.class_name, descriptor },
                );
                continue;
            }

            let type_name = match tree.leaf_type_name(&branch.name) {
                Some(type_name) => type_name,
                None => {
                    let title = tree.branch_title(&branch.name).unwrap_or_default();
                    let leaf = leaf_name_from_title(&title).to_string();
                    let type_name = tree.leaf_type_name(&leaf).ok_or_else(|| Error::LeafNotFound {
                        tree: tree_name.clone(),
                        branch: branch.name.clone(),
                        leaf: leaf.clone(),
                    })?;
                    tracing::debug!("branch '{}' holds leaf '{}' ({})", branch.name, leaf, type_name);
                    mismatches.insert(branch.name.clone(), leaf);
                    type_name
                }
            };
            types.insert(branch.name, BranchType::Leaf { type_name });
        }

        for (branch, leaf) in &mismatches {
            if types.contains_key(leaf) {
                return Err(Error::invalid(format!(
                    "tree '{tree_name}': leaf '{leaf}' of branch '{branch}' collides with a branch of the same name"
                )));
            }
            if let Some(branch_type) = types.remove(branch) {
                types.insert(leaf.clone(), branch_type);
            }
        }

        let aliases = tree.aliases().map(|aliases| {
            aliases
                .into_iter()
                .map(|(alias, title)| {
                    let target = title.strip_suffix(ALIAS_SUFFIX).unwrap_or(&title).to_string();
                    (alias, target)
                })
                .collect::<BTreeMap<_, _>>()
        });

        tracing::debug!(
            "catalog of '{}': {} branches, {} aliases, {} mismatches",
            tree_name,
            types.len(),
            aliases.as_ref().map_or(0, BTreeMap::len),
            mismatches.len()
        );

        Ok(Self {
            tree: tree_name,
            types,
            aliases,
            mismatches: (!mismatches.is_empty()).then_some(mismatches),
        })
    }

    /// Canonical name of a requested label.
    ///
    /// Aliases apply first; a mismatched branch name (looked up by the label
    /// as given) takes precedence over the alias target. An alias naming a
    /// mismatched branch follows it to the leaf.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        let mut name = label;
        if let Some(target) = self.aliases.as_ref().and_then(|a| a.get(label)) {
            name = target;
        }
        let leaf = |key: &str| self.mismatches.as_ref().and_then(|m| m.get(key));
        if let Some(leaf) = leaf(label).or_else(|| leaf(name)) {
            name = leaf;
        }
        self.types.get_key_value(name).map(|(k, _)| k.as_str())
    }

    /// Canonical names containing `pattern`, ignoring case. Sorted.
    pub fn find(&self, pattern: &str) -> Vec<String> {
        let pattern = pattern.to_lowercase();
        self.types
            .keys()
            .filter(|name| name.to_lowercase().contains(&pattern))
            .cloned()
            .collect()
    }

    pub fn branch_type(&self, name: &str) -> Option<&BranchType> {
        self.types.get(name)
    }

    /// Canonical names and types, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BranchType)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    /// Alias to canonical name, `None` if the tree has no aliases.
    pub fn aliases(&self) -> Option<&BTreeMap<String, String>> {
        self.aliases.as_ref()
    }

    /// Branch name to leaf name, `None` if every leaf matches its branch.
    pub fn mismatches(&self) -> Option<&BTreeMap<String, String>> {
        self.mismatches.as_ref()
    }
}

impl fmt::Display for BranchCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, branch_type) in &self.types {
            writeln!(f, "-- {name} ({branch_type})")?;
        }
        Ok(())
    }
}
