//! Error types for evtree.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for evtree operations.
///
/// End of sequence is not an error: iteration and element access report it
/// as `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at start of file
    #[error("Invalid store file: expected EVTR magic bytes")]
    InvalidMagic,

    /// Unsupported file format version
    #[error("Unsupported store version: {0}")]
    UnsupportedVersion(u16),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Explicitly requested tree is not a key of the file
    #[error("No tree called '{tree}' in '{file}'")]
    TreeNotFound { file: String, tree: String },

    /// Key exists but does not hold a tree
    #[error("'{name}' in '{file}' is a {class_name}, not a TTree")]
    NotATree { file: String, name: String, class_name: String },

    /// Scalar branch whose leaf is found neither by branch name nor by title
    #[error("Tree '{tree}': no leaf for branch '{branch}' (tried '{leaf}')")]
    LeafNotFound { tree: String, branch: String, leaf: String },

    /// Class string that cannot be parsed into a type descriptor
    #[error("Invalid type descriptor '{0}'")]
    InvalidTypeDescriptor(String),

    /// Type descriptor with no registered or structural decoder
    #[error("No decoder registered for type '{0}'")]
    UnresolvedType(String),

    /// Requested label is not an alias, mismatch or branch of the tree
    #[error("'{label}' is not a product of the '{tree}' tree")]
    ProductNotFound { label: String, tree: String },

    /// Product requested without a tree name while several trees are registered
    #[error("'{label}' requested without a tree name but {trees} trees are registered")]
    AmbiguousTree { label: String, trees: usize },

    /// Unknown configuration key
    #[error("Invalid option '{key}' (valid options: {valid})")]
    InvalidOption { key: String, valid: String },

    /// Product accessed before the owning tree loaded any entry
    #[error("The tree '{tree}' is not initialized: no entry has been loaded")]
    NotInitialized { tree: String },

    /// Entry index past the end of the tree
    #[error("Entry {index} out of range for tree '{tree}' ({count} entries)")]
    EntryOutOfRange { tree: String, index: u64, count: u64 },

    /// Raw entry bytes do not match the bound decode target
    #[error("Cannot decode branch '{branch}': {message}")]
    Decode { branch: String, message: String },

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a decode error for a branch.
    pub fn decode(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode { branch: branch.into(), message: message.into() }
    }
}

/// Result type alias for evtree operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = Error::EntryOutOfRange { tree: "Events".into(), index: 5, count: 3 };
        let msg = e.to_string();
        assert!(msg.contains("5"));
        assert!(msg.contains("3"));
        assert!(msg.contains("Events"));
    }

    #[test]
    fn test_error_context() {
        let e = Error::ProductNotFound { label: "jets".into(), tree: "Events".into() };
        assert_eq!(e.to_string(), "'jets' is not a product of the 'Events' tree");

        let e = Error::LeafNotFound {
            tree: "Events".into(),
            branch: "foo".into(),
            leaf: "bar".into(),
        };
        assert!(e.to_string().contains("foo"));
        assert!(e.to_string().contains("bar"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
