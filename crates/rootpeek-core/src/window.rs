//! Byte access to the inspected file.
//!
//! Files are read through a [`ByteSource`]. [`SlidingWindow`] memory-maps a
//! bounded window of the file and moves it lazily, so files of any size can
//! be inspected without mapping them in full. In-memory inputs use the
//! [`ByteSource`] implementation of [`Bytes`].
//!
//! # Window policy
//!
//! Windows always start on a half-window boundary. A read at position `p`
//! keeps the current mapping when `p` rounds down to the same half-window
//! boundary the mapping starts at, and remaps otherwise. This guarantees at
//! least half a window of look-ahead past every read position while letting
//! small backward seeks reuse the mapping.

use crate::error::{Error, Result};
use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default window size (16 MiB)
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 24;

/// Smallest accepted window size (64 KiB)
pub const MIN_WINDOW_SIZE: usize = 1 << 16;

/// Random access to the bytes of an input
pub trait ByteSource {
    /// Total length of the input
    fn len(&self) -> u64;

    /// Whether the input is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes from `position` onwards.
    ///
    /// The view holds at least `min_len` bytes unless the input ends first.
    /// It stays valid until the next call.
    fn view(&mut self, position: u64, min_len: usize) -> Result<&[u8]>;
}

impl ByteSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn view(&mut self, position: u64, _min_len: usize) -> Result<&[u8]> {
        let len = ByteSource::len(self);
        if position >= len {
            return Err(Error::PositionOutOfRange {
                position,
                file_len: len,
            });
        }
        Ok(&self[position as usize..])
    }
}

/// Configuration for the sliding window
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Window size in bytes; a power of two of at least 64 KiB
    pub window_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl WindowConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window size
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Check the window size
    pub fn validate(&self) -> Result<()> {
        if self.window_size < MIN_WINDOW_SIZE || !self.window_size.is_power_of_two() {
            return Err(Error::InvalidWindowSize {
                size: self.window_size,
            });
        }
        Ok(())
    }
}

/// A lazily repositioned read-only mapping over a file
#[derive(Debug)]
pub struct SlidingWindow {
    file: File,
    path: PathBuf,
    file_len: u64,
    window_size: usize,
    map: Option<Mmap>,
    map_offset: u64,
    remaps: usize,
}

impl SlidingWindow {
    /// Open `path` for windowed reading
    pub fn open(path: impl AsRef<Path>, config: &WindowConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_open(path, e))?;
        let file_len = file.metadata().map_err(|e| Error::file_open(path, e))?.len();

        debug!(path = %path.display(), file_len, window = config.window_size, "Opened file");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_len,
            window_size: config.window_size,
            map: None,
            map_offset: 0,
            remaps: 0,
        })
    }

    /// Path of the mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File offset of the current mapping, if any
    pub fn window_offset(&self) -> Option<u64> {
        self.map.as_ref().map(|_| self.map_offset)
    }

    /// Number of mappings created so far
    pub fn remaps(&self) -> usize {
        self.remaps
    }

    #[allow(unsafe_code)]
    fn remap(&mut self, base: u64, len: u64) -> Result<()> {
        // The old mapping is unmapped on drop, before the new one exists.
        self.map = None;

        let len = len.min(self.file_len - base) as usize;
        // SAFETY: Mmap is unsafe because the underlying file may be modified
        // by another process while mapped. The inspector only reads, the
        // mapping never outlives `self.file`, and every access goes through
        // `view()` which slices the map with bounds checks.
        let map = unsafe { MmapOptions::new().offset(base).len(len).map(&self.file) }
            .map_err(|source| Error::Map {
                offset: base,
                len,
                source,
            })?;

        debug!(offset = base, len, "Mapped window");
        self.map = Some(map);
        self.map_offset = base;
        self.remaps += 1;
        Ok(())
    }
}

impl ByteSource for SlidingWindow {
    fn len(&self) -> u64 {
        self.file_len
    }

    fn view(&mut self, position: u64, min_len: usize) -> Result<&[u8]> {
        if position >= self.file_len {
            return Err(Error::PositionOutOfRange {
                position,
                file_len: self.file_len,
            });
        }

        let half = (self.window_size / 2) as u64;
        let base = position & !(half - 1);
        let wanted_end = position.saturating_add(min_len as u64).min(self.file_len);

        let covered = self.map.as_ref().is_some_and(|map| {
            self.map_offset == base && self.map_offset + map.len() as u64 >= wanted_end
        });
        if !covered {
            let len = (self.window_size as u64).max(wanted_end - base);
            self.remap(base, len)?;
        }

        let start = (position - self.map_offset) as usize;
        match &self.map {
            Some(map) => Ok(&map[start..]),
            None => Err(Error::PositionOutOfRange {
                position,
                file_len: self.file_len,
            }),
        }
    }
}
