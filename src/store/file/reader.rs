//! EVTR file reader.
//!
//! Opening a file parses the header and the directory only. A branch's
//! offsets table is read, and its block inflated, the first time the
//! branch is bound; unbound branches are never touched.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::core::{decompress, BranchInfo, KeyInfo, LeafSlot, ObjectSlot, StorageFile, TreeReader};
use crate::store::{Bindings, EntrySource, TreeSchema};
use crate::util::{Error, Result};

/// Input streams over an EVTR file.
/// Supports both memory-mapped and buffered I/O modes.
pub struct Streams {
    inner: StreamsInner,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred)
    Mmap(Mmap),
    /// Seek-and-read fallback
    File(Mutex<File>),
}

impl Streams {
    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = if use_mmap && cfg!(feature = "mmap") {
            // Safety: the file is opened read-only and never mutated through the map
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(Mutex::new(file))
        };
        Ok(Self { inner, size })
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self.inner, StreamsInner::Mmap(_))
    }

    /// Bytes at `pos`, borrowed from the map when there is one.
    pub fn bytes(&self, pos: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let end = pos.checked_add(len as u64).ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }
        match &self.inner {
            StreamsInner::Mmap(mmap) => Ok(Cow::Borrowed(&mmap[pos as usize..end as usize])),
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(pos))?;
                let mut buf = vec![0u8; len];
                f.read_exact(&mut buf)?;
                Ok(Cow::Owned(buf))
            }
        }
    }

    pub fn read_u16(&self, pos: u64) -> Result<u16> {
        let b = self.bytes(pos, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let b = self.bytes(pos, 8)?;
        Ok(u64::from_le(bytemuck::pod_read_unaligned(&b[..])))
    }
}

/// An open EVTR file.
pub struct StoreFile {
    name: String,
    version: u16,
    streams: Arc<Streams>,
    entries: Vec<DirEntry>,
}

impl StoreFile {
    /// Open a file, memory-mapped when the `mmap` feature is enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, true)
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let streams = Streams::open_opts(path, use_mmap)?;

        let magic = streams.bytes(0, MAGIC.len())?;
        if magic[..] != MAGIC[..] {
            return Err(Error::InvalidMagic);
        }
        let version = streams.read_u16(VERSION_OFFSET as u64)?;
        if version == 0 || version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        if streams.read_u16(FLAGS_OFFSET as u64)? & FLAG_FINISHED == 0 {
            return Err(Error::invalid("file was not finished (no directory)"));
        }
        let dir_pos = streams.read_u64(DIR_POS_OFFSET as u64)?;
        if dir_pos < HEADER_SIZE as u64 || dir_pos > streams.size() {
            return Err(Error::invalid(format!("directory position {dir_pos} outside the file")));
        }

        let dir = streams.bytes(dir_pos, (streams.size() - dir_pos) as usize)?;
        let entries = read_directory(&dir)?;
        tracing::debug!(
            path = %path.display(),
            keys = entries.len(),
            mmap = streams.is_mmap(),
            "store opened"
        );

        Ok(Self {
            name: path.display().to_string(),
            version,
            streams: Arc::new(streams),
            entries,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Whether the file is memory-mapped.
    pub fn is_mmap(&self) -> bool {
        self.streams.is_mmap()
    }

    /// Schema and block locations of the first tree called `name`.
    pub fn tree_record(&self, name: &str) -> Option<(&TreeSchema, &[BlockLoc])> {
        self.entries
            .iter()
            .filter(|e| e.key.name == name)
            .find_map(|e| e.tree.as_ref())
            .map(|(schema, locs)| (schema, locs.as_slice()))
    }
}

impl StorageFile for StoreFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> Vec<KeyInfo> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    fn tree(&self, name: &str) -> Result<Box<dyn TreeReader>> {
        match self.tree_record(name) {
            Some((schema, locs)) => Ok(Box::new(FileTree {
                streams: Arc::clone(&self.streams),
                schema: schema.clone(),
                locs: locs.to_vec(),
                bindings: Bindings::default(),
                prepared: HashMap::new(),
            })),
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

/// A bound branch: its offsets and, when stored compressed, the inflated block.
struct Prepared {
    offsets: Vec<u64>,
    inflated: Option<Vec<u8>>,
}

/// Tree reader over an EVTR file.
pub struct FileTree {
    streams: Arc<Streams>,
    schema: TreeSchema,
    locs: Vec<BlockLoc>,
    bindings: Bindings,
    prepared: HashMap<usize, Prepared>,
}

impl FileTree {
    fn prepare(&mut self, index: usize) -> Result<()> {
        if self.prepared.contains_key(&index) {
            return Ok(());
        }
        let branch = &self.schema.branches[index].name;
        let loc = self.locs[index];
        let prepared = read_prepared(&self.streams, &loc, self.schema.num_entries)
            .map_err(|e| Error::decode(branch, e.to_string()))?;
        tracing::trace!(
            tree = %self.schema.name,
            branch = %branch,
            compressed = loc.compressed,
            "branch block prepared"
        );
        self.prepared.insert(index, prepared);
        Ok(())
    }
}

fn read_prepared(streams: &Streams, loc: &BlockLoc, num_entries: u64) -> Result<Prepared> {
    let table_len = usize::try_from(num_entries)
        .ok()
        .and_then(|n| n.checked_add(1))
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| Error::invalid(format!("{num_entries} entries overflow the offsets table")))?;
    let table = streams.bytes(loc.offsets_pos, table_len)?;
    let offsets: Vec<u64> = table
        .chunks_exact(8)
        .map(|c| u64::from_le(bytemuck::pod_read_unaligned(c)))
        .collect();

    if offsets.first() != Some(&0)
        || offsets.last() != Some(&loc.raw_len)
        || offsets.windows(2).any(|w| w[0] > w[1])
    {
        return Err(Error::invalid("inconsistent offsets table"));
    }

    let block_len = usize::try_from(loc.block_len).map_err(|_| Error::invalid("block too large"))?;
    let inflated = if loc.compressed {
        let stored = streams.bytes(loc.block_pos, block_len)?;
        Some(decompress(&stored, loc.raw_len as usize)?)
    } else if loc.block_len != loc.raw_len {
        return Err(Error::invalid(format!(
            "uncompressed block of {} bytes, expected {}",
            loc.block_len, loc.raw_len
        )));
    } else {
        None
    };
    Ok(Prepared { offsets, inflated })
}

struct FileSource<'a> {
    streams: &'a Streams,
    locs: &'a [BlockLoc],
    prepared: &'a HashMap<usize, Prepared>,
}

impl EntrySource for FileSource<'_> {
    fn raw(&self, branch: usize, entry: u64) -> Result<Cow<'_, [u8]>> {
        let prepared = self
            .prepared
            .get(&branch)
            .ok_or_else(|| Error::invalid(format!("branch {branch} read before it was bound")))?;
        let e = entry as usize;
        let (start, end) = match (prepared.offsets.get(e), prepared.offsets.get(e + 1)) {
            (Some(&a), Some(&b)) => (a, b),
            _ => return Err(Error::invalid(format!("no offsets for entry {entry}"))),
        };
        match &prepared.inflated {
            Some(block) => block
                .get(start as usize..end as usize)
                .map(Cow::Borrowed)
                .ok_or(Error::UnexpectedEof(end)),
            None => self.streams.bytes(self.locs[branch].block_pos + start, (end - start) as usize),
        }
    }
}

impl TreeReader for FileTree {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn num_entries(&self) -> u64 {
        self.schema.num_entries
    }

    fn branches(&self) -> Vec<BranchInfo> {
        self.schema.branch_infos()
    }

    fn leaf_type_name(&self, name: &str) -> Option<String> {
        self.schema.leaf_type_name(name)
    }

    fn branch_title(&self, name: &str) -> Option<String> {
        self.schema.branch_title(name)
    }

    fn aliases(&self) -> Option<Vec<(String, String)>> {
        self.schema.alias_table()
    }

    fn bind_leaf(&mut self, leaf: &str) -> Result<LeafSlot> {
        if let Some((index, _)) = self.schema.leaf_branch(leaf) {
            self.prepare(index)?;
        }
        let source = FileSource {
            streams: &self.streams,
            locs: &self.locs,
            prepared: &self.prepared,
        };
        self.bindings.bind_leaf(&self.schema, &source, leaf).map(|(_, slot)| slot)
    }

    fn bind_object(&mut self, branch: &str, target: ObjectSlot) -> Result<()> {
        if let Some(index) = self.schema.branch_index(branch) {
            self.prepare(index)?;
        }
        let source = FileSource {
            streams: &self.streams,
            locs: &self.locs,
            prepared: &self.prepared,
        };
        self.bindings.bind_object(&self.schema, &source, branch, target).map(|_| ())
    }

    fn load_entry(&mut self, index: u64) -> Result<()> {
        tracing::trace!(tree = %self.schema.name, entry = index, "load entry");
        let source = FileSource {
            streams: &self.streams,
            locs: &self.locs,
            prepared: &self.prepared,
        };
        self.bindings.load(&self.schema, &source, index)
    }
}
