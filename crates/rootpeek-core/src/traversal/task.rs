//! Units of pending traversal work.

use bytes::Bytes;
use std::fmt;

/// What a task decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Print the file header
    FileHeader,
    /// Print one key and its payload
    KeyHeader,
    /// Print a sub-directory header
    SubDirectory,
    /// Print the top directory header
    TopDirectory,
    /// Decode an uncompressed streamer catalog
    StreamerCatalog,
    /// Hex dump an arbitrary byte range
    RawRange,
    /// Read the file header and stream every key
    StreamAllKeys,
    /// Read the file header and stream the digest of every key
    StreamAllHashes,
    /// Print one key, then continue with its successor
    DecodeOneKey,
    /// Print the digest of one key, then continue with its successor
    HashOneKey,
    /// Print the streamer catalog key and decode its payload
    StreamStreamerCatalog,
    /// Read the file header and decode the streamer catalog
    ListStreamerCatalog,
    /// Stop the traversal and leave the inspector
    Terminate,
    /// No decoder; aborts the branch
    Unknown,
}

impl NodeKind {
    /// Kinds that can be named in shell commands
    pub const LABELLED: [(&'static str, NodeKind); 5] = [
        ("key", NodeKind::KeyHeader),
        ("subdir", NodeKind::SubDirectory),
        ("file", NodeKind::FileHeader),
        ("topdir", NodeKind::TopDirectory),
        ("StreamerInfo", NodeKind::StreamerCatalog),
    ];

    /// Kind named by a shell label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::LABELLED
            .iter()
            .find(|(name, _)| *name == label)
            .map(|&(_, kind)| kind)
    }

    /// Returns the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileHeader => "file-header",
            Self::KeyHeader => "key",
            Self::SubDirectory => "subdir",
            Self::TopDirectory => "topdir",
            Self::StreamerCatalog => "streamer-catalog",
            Self::RawRange => "raw-range",
            Self::StreamAllKeys => "stream-keys",
            Self::StreamAllHashes => "stream-hashes",
            Self::DecodeOneKey => "next-key",
            Self::HashOneKey => "next-hash",
            Self::StreamStreamerCatalog => "streamer-catalog-key",
            Self::ListStreamerCatalog => "list-streamer-catalog",
            Self::Terminate => "terminate",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the handler reads any bytes
    pub fn needs_bytes(&self) -> bool {
        !matches!(self, Self::Terminate | Self::Unknown)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task's bytes come from
#[derive(Debug, Clone)]
pub enum Source {
    /// An absolute file offset, read through the byte source
    Offset(u64),
    /// A buffer that was already produced, e.g. by decompression
    Buffer(Bytes),
}

/// One pending unit of work
#[derive(Debug, Clone)]
pub struct Task {
    /// Bytes to decode
    pub source: Source,
    /// Decoder to apply
    pub kind: NodeKind,
    /// Explicit byte length, for raw ranges
    pub length: Option<usize>,
    /// Offset of the buffer's first byte inside its enclosing object buffer.
    ///
    /// Class back-references inside streamed objects are positions in that
    /// enclosing buffer, which starts with the key header.
    pub origin: u64,
    /// Speculative task: a failed decode is skipped instead of aborting
    pub probe: bool,
    /// Last offset of a range scan this task belongs to
    pub scan_end: Option<u64>,
}

impl Task {
    /// A task reading the file at `position`
    pub fn at(kind: NodeKind, position: u64) -> Self {
        Self {
            source: Source::Offset(position),
            kind,
            length: None,
            origin: 0,
            probe: false,
            scan_end: None,
        }
    }

    /// A task over an in-memory buffer
    pub fn in_buffer(kind: NodeKind, buffer: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Buffer(buffer.into()),
            kind,
            length: None,
            origin: 0,
            probe: false,
            scan_end: None,
        }
    }

    /// A probe at `begin` that is followed by one at every later offset up
    /// to `end`, created one at a time as the scan advances
    pub fn scan(kind: NodeKind, begin: u64, end: u64) -> Self {
        Self {
            scan_end: Some(end),
            ..Self::at(kind, begin).probe()
        }
    }

    /// The probe at the next offset of this task's range scan, if any
    pub fn scan_successor(&self) -> Option<Self> {
        let (Source::Offset(position), Some(end)) = (&self.source, self.scan_end) else {
            return None;
        };
        (*position < end).then(|| Self {
            source: Source::Offset(position + 1),
            ..self.clone()
        })
    }

    /// A task ending the traversal
    pub fn terminate() -> Self {
        Self::at(NodeKind::Terminate, 0)
    }

    /// Sets an explicit length
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the buffer origin
    pub fn with_origin(mut self, origin: u64) -> Self {
        self.origin = origin;
        self
    }

    /// Marks the task as speculative
    pub fn probe(mut self) -> Self {
        self.probe = true;
        self
    }

    /// File offset of the task, or 0 for in-memory buffers
    pub fn position(&self) -> u64 {
        match self.source {
            Source::Offset(position) => position,
            Source::Buffer(_) => 0,
        }
    }
}
