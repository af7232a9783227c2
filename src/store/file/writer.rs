//! EVTR file writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::core::{compress, KeyInfo, TREE_CLASS};
use crate::store::TreeData;
use crate::util::{Error, Result};

/// Output stream tracking the write position.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create a new output stream for the given file path.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        Ok(Self { writer: BufWriter::with_capacity(1024 * 1024, file), pos: 0 })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Seek to a position and return it.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        self.pos = self.writer.seek(SeekFrom::Start(pos))?;
        Ok(self.pos)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes trees into an EVTR file.
///
/// The file is unreadable until [`StoreWriter::finish`] writes the
/// directory and marks the header finished.
pub struct StoreWriter {
    stream: OStream,
    entries: Vec<DirEntry>,
    level: u32,
}

impl StoreWriter {
    /// Create the file, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = OStream::create(path)?;
        write_header(&mut stream, 0, 0)?;
        Ok(Self { stream, entries: Vec::new(), level: 6 })
    }

    /// Set the zlib level of branch blocks (0 disables compression).
    pub fn compression(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Write a tree's blocks and add it to the directory.
    pub fn add_tree(&mut self, tree: &TreeData) -> Result<&mut Self> {
        let mut locs = Vec::with_capacity(tree.payloads.len());
        for (record, column) in tree.schema.branches.iter().zip(&tree.payloads) {
            if column.len() as u64 != tree.num_entries() {
                return Err(Error::other(format!(
                    "branch '{}' has {} entries, tree '{}' has {}",
                    record.name,
                    column.len(),
                    tree.name(),
                    tree.num_entries()
                )));
            }
            locs.push(self.write_block(column)?);
        }
        tracing::debug!(tree = tree.name(), branches = locs.len(), entries = tree.num_entries(), "tree written");
        self.entries.push(DirEntry {
            key: KeyInfo::new(tree.name(), TREE_CLASS),
            tree: Some((tree.schema.clone(), locs)),
        });
        Ok(self)
    }

    /// Add a key that holds no tree.
    pub fn add_key(&mut self, name: impl Into<String>, class_name: impl Into<String>) -> &mut Self {
        self.entries.push(DirEntry { key: KeyInfo::new(name, class_name), tree: None });
        self
    }

    fn write_block(&mut self, column: &[Vec<u8>]) -> Result<BlockLoc> {
        let offsets_pos = self.stream.pos();
        let mut offset = 0u64;
        self.stream.write_u64(offset)?;
        for raw in column {
            offset += raw.len() as u64;
            self.stream.write_u64(offset)?;
        }

        let block = column.concat();
        let block_pos = self.stream.pos();
        let packed = compress(&block, self.level)?;
        let stored = packed.as_deref().unwrap_or(&block);
        self.stream.write_bytes(stored)?;

        Ok(BlockLoc {
            compressed: packed.is_some(),
            offsets_pos,
            block_pos,
            block_len: stored.len() as u64,
            raw_len: block.len() as u64,
        })
    }

    /// Write the directory and finalize the header.
    pub fn finish(mut self) -> Result<()> {
        let dir = write_directory(&self.entries)?;
        let dir_pos = self.stream.pos();
        self.stream.write_bytes(&dir)?;
        self.stream.seek(0)?;
        write_header(&mut self.stream, FLAG_FINISHED, dir_pos)?;
        self.stream.flush()
    }
}

fn write_header(stream: &mut OStream, flags: u16, dir_pos: u64) -> Result<()> {
    stream.write_bytes(MAGIC)?;
    stream.write_u16(CURRENT_VERSION)?;
    stream.write_u16(flags)?;
    stream.write_u64(dir_pos)
}
