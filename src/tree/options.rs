//! Session configuration.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::TypeRegistry;
use crate::util::{Error, Result};

/// Keys accepted by [`SessionOptions::from_pairs`] and [`SessionOptions::from_json`].
pub const VALID_OPTIONS: &[&str] = &["trees", "use_mmap"];

/// Options for opening a [`FileSession`](super::FileSession).
///
/// ```ignore
/// let options = SessionOptions::new()
///     .trees(["Events", "Runs"])
///     .registry(Arc::new(registry))
///     .use_mmap(false);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Trees to register; `None` registers every tree of the file.
    #[serde(deserialize_with = "one_or_many")]
    pub trees: Option<Vec<String>>,
    /// Memory-map file stores.
    pub use_mmap: bool,
    /// Resolves the classes of object branches.
    #[serde(skip)]
    pub registry: Arc<TypeRegistry>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { trees: None, use_mmap: true, registry: Arc::default() }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register only these trees.
    pub fn trees<I, S>(mut self, trees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trees = Some(trees.into_iter().map(Into::into).collect());
        self
    }

    /// Add one tree to the explicit list.
    pub fn tree(mut self, tree: impl Into<String>) -> Self {
        self.trees.get_or_insert_with(Vec::new).push(tree.into());
        self
    }

    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn use_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    /// Parse keyword options such as `("trees", "Events,Runs")`.
    ///
    /// `trees` takes a comma-separated list, `use_mmap` a boolean.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "trees" => {
                    let trees = value.split(',').map(str::trim).filter(|t| !t.is_empty());
                    options.trees = Some(trees.map(str::to_string).collect());
                }
                "use_mmap" => {
                    options.use_mmap = value.parse().map_err(|_| {
                        Error::other(format!("option 'use_mmap' expects true or false, got '{value}'"))
                    })?;
                }
                _ => return Err(invalid_option(key)),
            }
        }
        Ok(options)
    }

    /// Parse options from a JSON object, e.g. `{"trees": ["Events"]}`.
    /// `trees` may also be a single string.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::other(format!("invalid options: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::other("options must be a JSON object"))?;
        if let Some(key) = object.keys().find(|k| !VALID_OPTIONS.contains(&k.as_str())) {
            return Err(invalid_option(key));
        }
        serde_json::from_value(value).map_err(|e| Error::other(format!("invalid options: {e}")))
    }
}

fn invalid_option(key: &str) -> Error {
    Error::InvalidOption { key: key.to_string(), valid: VALID_OPTIONS.join(", ") }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Trees {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<Trees>::deserialize(deserializer)?.map(|trees| match trees {
        Trees::One(tree) => vec![tree],
        Trees::Many(trees) => trees,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = SessionOptions::new().tree("Events").tree("Runs").use_mmap(false);
        assert_eq!(options.trees, Some(vec!["Events".to_string(), "Runs".to_string()]));
        assert!(!options.use_mmap);
        assert!(SessionOptions::default().trees.is_none());
    }

    #[test]
    fn test_from_pairs() {
        let options = SessionOptions::from_pairs([("trees", "Events, Runs"), ("use_mmap", "false")]).unwrap();
        assert_eq!(options.trees, Some(vec!["Events".to_string(), "Runs".to_string()]));
        assert!(!options.use_mmap);

        match SessionOptions::from_pairs([("tres", "Events")]) {
            Err(Error::InvalidOption { key, valid }) => {
                assert_eq!(key, "tres");
                assert_eq!(valid, "trees, use_mmap");
            }
            other => panic!("expected InvalidOption, got {other:?}"),
        }
        assert!(SessionOptions::from_pairs([("use_mmap", "maybe")]).is_err());
    }

    #[test]
    fn test_from_json() {
        let options = SessionOptions::from_json(r#"{"trees": "Events"}"#).unwrap();
        assert_eq!(options.trees, Some(vec!["Events".to_string()]));
        assert!(options.use_mmap);

        let options = SessionOptions::from_json(r#"{"trees": ["A", "B"], "use_mmap": false}"#).unwrap();
        assert_eq!(options.trees.map(|t| t.len()), Some(2));

        assert!(matches!(
            SessionOptions::from_json(r#"{"canvas": 1}"#),
            Err(Error::InvalidOption { .. })
        ));
        assert!(SessionOptions::from_json(r#"{"trees": 3}"#).is_err());
        assert!(SessionOptions::from_json("[]").is_err());
    }
}
