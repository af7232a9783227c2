//! EVTR format constants and directory records.
//!
//! ```text
//! +--------------------+
//! | Magic: "EVTR"      |  4 bytes
//! | Version            |  u16 LE
//! | Flags              |  u16 LE (FLAG_FINISHED once the directory is written)
//! | Directory Pos      |  u64 LE
//! +--------------------+
//! | Offsets | Block    |  one pair per branch
//! | ...                |
//! +--------------------+
//! | Directory          |
//! +--------------------+
//! ```
//!
//! Directory: `u32` key count, then per key its name, class name and a
//! `u8` tree flag followed by the tree record for tree keys. Strings are a
//! `u32` length plus UTF-8 bytes.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::core::KeyInfo;
use crate::store::{BranchRecord, LeafDecl, TreeSchema};
use crate::util::{Error, Result};

/// Magic bytes at the start of an EVTR file.
pub const MAGIC: &[u8; 4] = b"EVTR";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the flags in the header.
pub const FLAGS_OFFSET: usize = 6;

/// Offset of the directory position in the header.
pub const DIR_POS_OFFSET: usize = 8;

/// Current format version.
pub const CURRENT_VERSION: u16 = 1;

/// Set once the writer has written the directory.
pub const FLAG_FINISHED: u16 = 1;

/// Where a branch's entries live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockLoc {
    pub compressed: bool,
    /// Position of the `u64 × (entries + 1)` offsets table.
    pub offsets_pos: u64,
    pub block_pos: u64,
    /// Stored size of the block.
    pub block_len: u64,
    /// Size of the block once inflated.
    pub raw_len: u64,
}

/// One key of the directory, with its tree when it holds one.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub key: KeyInfo,
    pub tree: Option<(TreeSchema, Vec<BlockLoc>)>,
}

pub(crate) fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u32::try_from(s.len()).map_err(|_| Error::other(format!("string too long: {} bytes", s.len())))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn read_str(input: &mut &[u8]) -> Result<String> {
    let len = input.read_u32::<LittleEndian>()? as usize;
    if len > input.len() {
        return Err(Error::invalid(format!("string of {len} bytes overruns the directory")));
    }
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::other(format!("too many directory records: {len}")))
}

/// Serialize the directory.
pub fn write_directory(entries: &[DirEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(count(entries.len())?)?;
    for entry in entries {
        write_str(&mut out, &entry.key.name)?;
        write_str(&mut out, &entry.key.class_name)?;
        match &entry.tree {
            None => out.write_u8(0)?,
            Some((schema, locs)) => {
                out.write_u8(1)?;
                write_tree(&mut out, schema, locs)?;
            }
        }
    }
    Ok(out)
}

fn write_tree(out: &mut Vec<u8>, schema: &TreeSchema, locs: &[BlockLoc]) -> Result<()> {
    write_str(out, &schema.name)?;
    out.write_u64::<LittleEndian>(schema.num_entries)?;
    out.write_u32::<LittleEndian>(count(schema.aliases.len())?)?;
    for (alias, title) in &schema.aliases {
        write_str(out, alias)?;
        write_str(out, title)?;
    }
    out.write_u32::<LittleEndian>(count(schema.branches.len())?)?;
    for (branch, loc) in schema.branches.iter().zip(locs) {
        write_str(out, &branch.name)?;
        write_str(out, &branch.class_name)?;
        write_str(out, &branch.title)?;
        match &branch.leaf {
            None => out.write_u8(0)?,
            Some(leaf) => {
                out.write_u8(1)?;
                write_str(out, &leaf.name)?;
                write_str(out, &leaf.type_name)?;
            }
        }
        out.write_u8(loc.compressed as u8)?;
        out.write_u64::<LittleEndian>(loc.offsets_pos)?;
        out.write_u64::<LittleEndian>(loc.block_pos)?;
        out.write_u64::<LittleEndian>(loc.block_len)?;
        out.write_u64::<LittleEndian>(loc.raw_len)?;
    }
    Ok(())
}

/// Parse the directory.
pub fn read_directory(mut input: &[u8]) -> Result<Vec<DirEntry>> {
    let input = &mut input;
    let n = input.read_u32::<LittleEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..n {
        let name = read_str(input)?;
        let class_name = read_str(input)?;
        let tree = match input.read_u8()? {
            0 => None,
            1 => Some(read_tree(input)?),
            flag => return Err(Error::invalid(format!("key '{name}': bad tree flag {flag}"))),
        };
        entries.push(DirEntry { key: KeyInfo::new(name, class_name), tree });
    }
    Ok(entries)
}

fn read_tree(input: &mut &[u8]) -> Result<(TreeSchema, Vec<BlockLoc>)> {
    let name = read_str(input)?;
    let num_entries = input.read_u64::<LittleEndian>()?;

    let n_aliases = input.read_u32::<LittleEndian>()?;
    let mut aliases = Vec::new();
    for _ in 0..n_aliases {
        aliases.push((read_str(input)?, read_str(input)?));
    }

    let n_branches = input.read_u32::<LittleEndian>()?;
    let mut branches = Vec::new();
    let mut locs = Vec::new();
    for _ in 0..n_branches {
        let branch_name = read_str(input)?;
        let class_name = read_str(input)?;
        let title = read_str(input)?;
        let leaf = match input.read_u8()? {
            0 => None,
            _ => Some(LeafDecl::new(read_str(input)?, read_str(input)?)),
        };
        let compressed = input.read_u8()? != 0;
        locs.push(BlockLoc {
            compressed,
            offsets_pos: input.read_u64::<LittleEndian>()?,
            block_pos: input.read_u64::<LittleEndian>()?,
            block_len: input.read_u64::<LittleEndian>()?,
            raw_len: input.read_u64::<LittleEndian>()?,
        });
        branches.push(BranchRecord { name: branch_name, class_name, title, leaf });
    }

    Ok((TreeSchema { name, num_entries, branches, aliases }, locs))
}
