//! Region files: many chunks stored in one file behind a presence bitmap.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4096 | Presence bitmap, 1 bit per slot, LSB first within each byte |
//! | 4096 + slot×4096 | 4096 | Voxel ordinals, x-major then y then z |
//!
//! A region covers [`REGION_SIZE`]³ chunks. The slot index of a chunk is
//! `((lx * R) + ly) * R + lz` where `l` is the chunk coordinate modulo R.
//! Slots are rewritten in place; a slot's bit is set only after its bytes
//! have been written.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::chunk::{Chunk, ChunkOrigin};
use crate::coords::{CHUNK_VOLUME, ChunkCoord, REGION_VOLUME, RegionCoord};
use crate::voxel::Voxel;

/// Size of the presence bitmap header in bytes.
pub const HEADER_BYTES: u64 = REGION_VOLUME.div_ceil(8) as u64;

/// Size of one chunk slot in bytes.
pub const SLOT_BYTES: u64 = CHUNK_VOLUME as u64;

/// Errors that can occur while reading or writing a region file.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// An I/O operation on the region file failed.
    #[error("region I/O failed for {}: {source}", path.display())]
    Io {
        /// Region file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A slot holds a byte that is not a valid voxel ordinal.
    #[error("corrupt voxel byte {byte} at offset {offset} in chunk {coord}")]
    CorruptVoxel {
        /// Chunk whose slot is corrupt.
        coord: ChunkCoord,
        /// Byte offset within the slot.
        offset: usize,
        /// The offending byte.
        byte: u8,
    },
}

/// Reads and writes chunks in region files under one directory.
///
/// File handles are opened and closed within each call. Saves to the same
/// region are serialized by a per-region lock; different regions never contend.
#[derive(Debug)]
pub struct RegionStore {
    root: PathBuf,
    locks: DashMap<RegionCoord, Arc<Mutex<()>>>,
}

impl RegionStore {
    /// Creates a store rooted at `root`. The directory is not created here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    /// Returns the directory holding the region files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path for a region.
    pub fn region_path(&self, region: RegionCoord) -> PathBuf {
        self.root
            .join(format!("r.{}.{}.{}.rgn", region.x, region.y, region.z))
    }

    /// Byte offset of a chunk's slot within its region file.
    pub fn slot_offset(coord: ChunkCoord) -> u64 {
        HEADER_BYTES + coord.region_slot() as u64 * SLOT_BYTES
    }

    /// Loads the chunk at `coord`.
    ///
    /// Returns `Ok(None)` if the region file is absent, shorter than its
    /// header, has the presence bit clear, or is too short to hold the slot.
    pub fn load(&self, coord: ChunkCoord) -> Result<Option<Chunk>, RegionError> {
        let path = self.region_path(coord.region());
        let io_err = |source| RegionError::Io {
            path: path.clone(),
            source,
        };

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        let len = file.metadata().map_err(io_err)?.len();
        if len < HEADER_BYTES {
            tracing::debug!(%coord, len, "region file shorter than header");
            return Ok(None);
        }

        let slot = coord.region_slot();
        let mut flags = [0u8; 1];
        file.seek(SeekFrom::Start((slot / 8) as u64))
            .map_err(io_err)?;
        file.read_exact(&mut flags).map_err(io_err)?;
        if flags[0] & (1 << (slot % 8)) == 0 {
            return Ok(None);
        }

        let offset = Self::slot_offset(coord);
        if len < offset + SLOT_BYTES {
            tracing::debug!(%coord, len, "region file truncated inside slot");
            return Ok(None);
        }

        let mut bytes = vec![0u8; CHUNK_VOLUME];
        file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        file.read_exact(&mut bytes).map_err(io_err)?;

        let voxels = bytes
            .iter()
            .enumerate()
            .map(|(offset, &byte)| {
                Voxel::from_ordinal(byte).ok_or(RegionError::CorruptVoxel {
                    coord,
                    offset,
                    byte,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let chunk = Chunk::new(coord);
        chunk.fill(&voxels, ChunkOrigin::Loaded);
        Ok(Some(chunk))
    }

    /// Writes `chunk` into its slot and sets its presence bit.
    ///
    /// Returns the chunk version that was written so the caller can pass it
    /// to [`Chunk::mark_saved`].
    pub fn save(&self, chunk: &Chunk) -> Result<u64, RegionError> {
        let coord = chunk.coord();
        let region = coord.region();
        let path = self.region_path(region);
        let io_err = |source| RegionError::Io {
            path: path.clone(),
            source,
        };

        let lock = Arc::clone(self.locks.entry(region).or_default().value());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let version = chunk.version();
        let bytes: Vec<u8> = chunk.snapshot().into_iter().map(Voxel::ordinal).collect();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;
        if file.metadata().map_err(io_err)?.len() < HEADER_BYTES {
            file.set_len(HEADER_BYTES).map_err(io_err)?;
        }

        file.seek(SeekFrom::Start(Self::slot_offset(coord)))
            .map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;

        let slot = coord.region_slot();
        let flag_offset = (slot / 8) as u64;
        let mut flags = [0u8; 1];
        file.seek(SeekFrom::Start(flag_offset)).map_err(io_err)?;
        file.read_exact(&mut flags).map_err(io_err)?;
        flags[0] |= 1 << (slot % 8);
        file.seek(SeekFrom::Start(flag_offset)).map_err(io_err)?;
        file.write_all(&flags).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        Ok(version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
