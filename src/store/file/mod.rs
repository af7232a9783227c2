//! EVTR binary container.
//!
//! A finished EVTR file holds any number of keys; tree keys carry their
//! schema and the location of one block per branch. See [`format`] for the
//! layout.

pub mod format;
mod reader;
mod writer;

pub use reader::{FileTree, StoreFile, Streams};
pub use writer::{OStream, StoreWriter};

#[cfg(test)]
mod tests {
    use std::io::{Seek, SeekFrom, Write};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::core::{StorageFile, TypeRegistry};
    use crate::store::{TreeBuilder, TreeData};
    use crate::util::{Error, Value};

    fn events() -> TreeData {
        let reg = TypeRegistry::new();
        let mut b = TreeBuilder::new("Events");
        b.add_leaf("n", "n/I").unwrap();
        b.add_object("w", "edm::Wrapper<std::vector<double> >", &reg).unwrap();
        for i in 0..50 {
            b.fill(|e| {
                e.set("n", i).set("w", vec![0.5; (i % 4) as usize]);
                Ok(())
            })
            .unwrap();
        }
        b.build()
    }

    fn write(level: u32) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let mut w = StoreWriter::create(file.path()).unwrap().compression(level);
        w.add_tree(&events()).unwrap();
        w.add_key("hPt", "TH1F");
        w.finish().unwrap();
        file
    }

    #[test]
    fn test_open_rejects_bad_files() {
        assert!(matches!(StoreFile::open("/no/such/file.evtr"), Err(Error::FileNotFound(_))));

        let mut junk = NamedTempFile::new().unwrap();
        junk.write_all(b"ROOT\x01\x00\x01\x00\x10\x00\x00\x00\x00\x00\x00\x00").unwrap();
        assert!(matches!(StoreFile::open(junk.path()), Err(Error::InvalidMagic)));

        let unfinished = NamedTempFile::new().unwrap();
        drop(StoreWriter::create(unfinished.path()).unwrap());
        assert!(StoreFile::open(unfinished.path()).is_err());
    }

    #[test]
    fn test_keys_and_trees() {
        let file = write(6);
        let store = StoreFile::open(file.path()).unwrap();
        assert_eq!(store.version(), format::CURRENT_VERSION);
        let keys = store.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].is_tree());
        assert!(matches!(store.tree("hPt"), Err(Error::NotATree { .. })));
        assert!(matches!(store.tree("Runs"), Err(Error::TreeNotFound { .. })));
    }

    #[test]
    fn test_load_without_mmap() {
        let file = write(0);
        let store = StoreFile::open_opts(file.path(), false).unwrap();
        assert!(!store.is_mmap());
        let mut tree = store.tree("Events").unwrap();
        let n = tree.bind_leaf("n").unwrap();
        tree.load_entry(49).unwrap();
        assert_eq!(n.read().get(0), Some(Value::Int(49)));
    }

    #[test]
    fn test_unbound_branch_is_never_read() {
        let file = write(6);
        let (w_pos, n_pos) = {
            let store = StoreFile::open(file.path()).unwrap();
            let (_, locs) = store.tree_record("Events").unwrap();
            assert!(locs[1].compressed);
            (locs[1].block_pos, locs[0].block_pos)
        };
        assert!(w_pos > n_pos);

        // clobber the start of the wrapped branch's zlib block
        let mut f = file.reopen().unwrap();
        f.seek(SeekFrom::Start(w_pos)).unwrap();
        f.write_all(&[0xFF; 4]).unwrap();
        drop(f);

        let store = StoreFile::open(file.path()).unwrap();
        let mut tree = store.tree("Events").unwrap();
        let n = tree.bind_leaf("n").unwrap();
        for i in 0..50 {
            tree.load_entry(i).unwrap();
        }
        assert_eq!(n.read().get(0), Some(Value::Int(49)));

        let reg = TypeRegistry::new();
        let desc = crate::core::TypeDescriptor::parse("edm::Wrapper<std::vector<double> >").unwrap();
        let slot = std::sync::Arc::new(parking_lot::RwLock::new(reg.construct(&desc).unwrap()));
        assert!(matches!(tree.bind_object("w", slot), Err(Error::Decode { .. })));
    }
}
