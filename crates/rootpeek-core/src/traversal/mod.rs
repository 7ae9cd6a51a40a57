//! The traversal state machine.
//!
//! Work is a LIFO stack of [`Task`]s. Each task names a decoder and the bytes
//! it applies to; its handler prints what it finds and may push follow-up
//! tasks, e.g. the next key of a file. Handlers run one at a time against a
//! view of the input that stays valid for the whole call.
//!
//! ## Failure handling
//!
//! A recoverable error (see [`Error::is_recoverable`]) aborts the current
//! branch: it is reported, the whole stack is cleared and the machine stays
//! usable for the next command. Tasks marked as probes, as created by range
//! scans, are simply dropped when they fail to decode. Any other error ends
//! [`Machine::run`].
//!
//! ```
//! use bytes::Bytes;
//! use rootpeek_core::traversal::{Machine, NodeKind, RunOutcome, Task, TraversalConfig};
//!
//! let input = Bytes::from_static(b"root\x00\x01\x02\x03");
//! let mut machine = Machine::new(input, Vec::new(), TraversalConfig::default());
//! machine.push(Task::at(NodeKind::RawRange, 0).with_length(4));
//! assert_eq!(machine.run().unwrap(), RunOutcome::Drained);
//! assert!(String::from_utf8_lossy(machine.output()).contains("|root|"));
//! ```

mod context;
mod handlers;
mod streamer;
mod task;

pub use context::{TraversalConfig, TraversalContext};
pub use task::{NodeKind, Source, Task};

use crate::compress::CodecRegistry;
use crate::digest::{Blake3Digest, DigestProvider};
use crate::error::{Error, Result};
use crate::layout::{Layout, LayoutPrinter};
use crate::window::ByteSource;
use std::io::Write;
use tracing::{debug, trace, warn};

/// What a handler asks the machine to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
    /// Call the handler again with a view of at least this many bytes
    Refetch(usize),
}

/// How [`Machine::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stack is empty
    Drained,
    /// A terminate task ran
    Quit,
}

/// Counters over the lifetime of a machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Tasks handed to a handler
    pub dispatched: usize,
    /// Branches aborted by an error
    pub aborted: usize,
    /// Probe tasks that did not decode
    pub probes_rejected: usize,
    /// Handler calls repeated with a larger view
    pub refetches: usize,
}

/// Everything a handler may touch besides its input bytes
struct Env<'a, W> {
    stack: &'a mut Vec<Task>,
    out: &'a mut W,
    context: &'a mut TraversalContext,
    config: &'a TraversalConfig,
    codecs: &'a CodecRegistry,
    digest: &'a dyn DigestProvider,
}

impl<W: Write> Env<'_, W> {
    fn emit(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Print a record `level` indentation steps deep, returning its size
    fn render(&mut self, layout: &'static Layout, buf: &[u8], level: usize) -> Result<usize> {
        let mut text = String::new();
        let size = LayoutPrinter::new(&mut text, &self.config.printer)
            .with_indent_level(level)
            .write_record(layout, buf)?;
        self.emit(&text)?;
        Ok(size)
    }

    /// Report an error that only invalidates part of a record
    fn report(&mut self, err: &Error) -> Result<()> {
        warn!(error = %err, "Skipping entry");
        writeln!(self.out, "{err}")?;
        Ok(())
    }

    /// Queue the record at `next` unless it lies past the used space
    fn push_next(&mut self, kind: NodeKind, next: u64) {
        if next < self.context.seek_free {
            self.stack.push(Task::at(kind, next));
        } else {
            debug!(next, seek_free = self.context.seek_free, "Reached the end of used space");
        }
    }
}

/// Runs tasks against a byte source, writing reports to `W`
pub struct Machine<S, W> {
    source: S,
    out: W,
    stack: Vec<Task>,
    context: TraversalContext,
    config: TraversalConfig,
    codecs: CodecRegistry,
    digest: Box<dyn DigestProvider>,
    stats: TraversalStats,
}

impl<S: ByteSource, W: Write> Machine<S, W> {
    /// Creates a machine with the default codecs and digest
    pub fn new(source: S, out: W, config: TraversalConfig) -> Self {
        let context = TraversalContext {
            seek_free: 0,
            dump_lines: config.key_dump_lines,
        };
        Self {
            source,
            out,
            stack: Vec::new(),
            context,
            config,
            codecs: CodecRegistry::default(),
            digest: Box::new(Blake3Digest),
            stats: TraversalStats::default(),
        }
    }

    /// Replaces the decompression codecs
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Replaces the payload digest
    pub fn with_digest(mut self, digest: impl DigestProvider + 'static) -> Self {
        self.digest = Box::new(digest);
        self
    }

    /// Push a task; the most recently pushed task runs first
    pub fn push(&mut self, task: Task) {
        self.stack.push(task);
    }

    /// Push tasks in order
    pub fn push_all(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.stack.extend(tasks);
    }

    /// Number of pending tasks
    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    /// Counters so far
    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    /// State shared by the handlers
    pub fn context(&self) -> &TraversalContext {
        &self.context
    }

    /// The byte source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The report sink
    pub fn output(&self) -> &W {
        &self.out
    }

    /// The report sink, mutably
    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Consumes the machine, returning the report sink
    pub fn into_output(self) -> W {
        self.out
    }

    /// Run tasks until the stack is empty or a terminate task runs
    pub fn run(&mut self) -> Result<RunOutcome> {
        while let Some(task) = self.stack.pop() {
            // The rest of a range scan runs after this task and its children
            if let Some(next) = task.scan_successor() {
                if next.position() < self.source.len() {
                    self.stack.push(next);
                }
            }
            match self.step(&task) {
                Ok(Flow::Quit) => {
                    self.stack.clear();
                    self.out.flush()?;
                    return Ok(RunOutcome::Quit);
                }
                Ok(_) => {}
                Err(err) if err.is_recoverable() => self.abort(&task, err)?,
                Err(err) => return Err(err),
            }
        }
        self.out.flush()?;
        Ok(RunOutcome::Drained)
    }

    fn step(&mut self, task: &Task) -> Result<Flow> {
        self.stats.dispatched += 1;
        trace!(
            kind = %task.kind,
            position = task.position(),
            pending = self.stack.len(),
            "Dispatching"
        );

        let mut min_len = task.length.unwrap_or(0);
        loop {
            let bytes: &[u8] = match &task.source {
                _ if !task.kind.needs_bytes() => &[],
                Source::Offset(position) => self.source.view(*position, min_len)?,
                Source::Buffer(buffer) => buffer,
            };
            let available = bytes.len();

            let mut env = Env {
                stack: &mut self.stack,
                out: &mut self.out,
                context: &mut self.context,
                config: &self.config,
                codecs: &self.codecs,
                digest: self.digest.as_ref(),
            };
            let flow = handlers::dispatch(task, bytes, &mut env)?;
            let Flow::Refetch(needed) = flow else {
                return Ok(flow);
            };

            let position = task.position();
            let grows = matches!(task.source, Source::Offset(_))
                && needed > min_len
                && position.saturating_add(needed as u64) <= self.source.len();
            if !grows {
                let offset = usize::try_from(position).unwrap_or(usize::MAX);
                return Err(Error::truncated(offset, needed, available));
            }
            debug!(position, needed, available, "Re-reading with a larger view");
            self.stats.refetches += 1;
            min_len = needed;
        }
    }

    fn abort(&mut self, task: &Task, err: Error) -> Result<()> {
        if task.probe {
            debug!(kind = %task.kind, position = task.position(), error = %err, "Probe rejected");
            self.stats.probes_rejected += 1;
            return Ok(());
        }

        warn!(
            kind = %task.kind,
            position = task.position(),
            dropped = self.stack.len(),
            error = %err,
            "Aborting traversal branch"
        );
        writeln!(self.out, "{err}")?;
        if let Some(dump) = err.dump() {
            self.out.write_all(dump.as_bytes())?;
        }
        self.stack.clear();
        self.stats.aborted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::root::fixtures::{file_header, key_header};
    use crate::compress::fixtures::zlib_block;
    use crate::window::{SlidingWindow, WindowConfig, MIN_WINDOW_SIZE};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BEGIN: usize = 100;

    /// Lays out keys one after another, starting at `BEGIN`
    struct FileBuilder {
        data: Vec<u8>,
    }

    impl FileBuilder {
        fn new() -> Self {
            Self {
                data: vec![0; BEGIN],
            }
        }

        fn key_claiming(
            &mut self,
            seek_key: u32,
            class: &str,
            name: &str,
            title: &str,
            stored: &[u8],
            obj_len: usize,
        ) -> u64 {
            let at = self.data.len() as u64;
            let header_len = key_header(0, 0, 0, class, name, title).len();
            let nbytes = (header_len + stored.len()) as i32;
            self.data
                .extend(key_header(nbytes, obj_len as u32, seek_key, class, name, title));
            self.data.extend_from_slice(stored);
            at
        }

        fn key(
            &mut self,
            class: &str,
            name: &str,
            title: &str,
            stored: &[u8],
            obj_len: usize,
        ) -> u64 {
            let at = self.data.len() as u32;
            self.key_claiming(at, class, name, title, stored, obj_len)
        }

        fn gap(&mut self, len: usize) -> u64 {
            let at = self.data.len() as u64;
            self.data.extend_from_slice(&(-(len as i32)).to_be_bytes());
            self.data.resize(self.data.len() + len - 4, 0xee);
            at
        }

        fn finish(mut self, seek_info: u64) -> Bytes {
            let len = self.data.len() as u32;
            let header = file_header(BEGIN as u32, len, len, seek_info as u32);
            self.data[..header.len()].copy_from_slice(&header);
            Bytes::from(self.data)
        }
    }

    struct Sample {
        bytes: Bytes,
        first: u64,
        catalog: u64,
        payload_a: Vec<u8>,
        payload_b: Vec<u8>,
    }

    fn sample() -> Sample {
        let payload_a = b"first payload, stored as is".repeat(3);
        let payload_b: Vec<u8> = (0..2000).map(|i| (i % 13) as u8).collect();
        let catalog_key_len =
            key_header(0, 0, 0, "TList", "StreamerInfo", "Doubly linked list").len() as u64;
        let catalog = streamer::fixtures::catalog(catalog_key_len);

        let mut file = FileBuilder::new();
        let first = file.key("TFile", "demo.root", "", &payload_a, payload_a.len());
        file.key("TTree", "Events", "Events", &zlib_block(&payload_b), payload_b.len());
        file.gap(32);
        file.key("edm::EventAuxiliary", "EventAuxiliary", "", b"aux", 3);
        let catalog_at = file.key(
            "TList",
            "StreamerInfo",
            "Doubly linked list",
            &zlib_block(&catalog),
            catalog.len(),
        );

        Sample {
            bytes: file.finish(catalog_at),
            first,
            catalog: catalog_at,
            payload_a,
            payload_b,
        }
    }

    fn run(
        input: Bytes,
        config: TraversalConfig,
        tasks: Vec<Task>,
    ) -> (String, TraversalStats, RunOutcome) {
        let mut machine = Machine::new(input, Vec::new(), config);
        machine.push_all(tasks);
        let outcome = machine.run().unwrap();
        let stats = *machine.stats();
        let output = String::from_utf8_lossy(&machine.into_output()).into_owned();
        (output, stats, outcome)
    }

    #[test]
    fn test_stream_all_keys() {
        let sample = sample();
        let (out, stats, outcome) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::StreamAllKeys, 0)],
        );

        assert_eq!(outcome, RunOutcome::Drained);
        assert_eq!(out.matches("Key of length").count(), 4);
        assert!(out.contains("Gap of 32 bytes"));
        assert!(out.contains(&format!("Hash: {}", Blake3Digest.hex_digest(&sample.payload_a))));
        // Compressed payloads are hashed after decompression
        assert!(out.contains(&format!("Hash: {}", Blake3Digest.hex_digest(&sample.payload_b))));
        assert!(out.contains("... (1840 more bytes)"));

        let first = out.find("\"demo.root\"").unwrap();
        let second = out.find("\"Events\"").unwrap();
        assert!(first < second);

        // Header, four keys and the gap
        assert_eq!(stats.dispatched, 6);
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_stream_all_hashes() {
        let sample = sample();
        let (out, stats, _) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::StreamAllHashes, 0)],
        );

        assert_eq!(out.matches("Hash for ").count(), 4);
        assert!(out.contains(&format!(
            "Hash for demo.root: {}",
            Blake3Digest.hex_digest(&sample.payload_a)
        )));
        assert!(out.contains(&format!(
            "Hash for Events: {}",
            Blake3Digest.hex_digest(&sample.payload_b)
        )));
        assert!(!out.contains("Key of length"));
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_ignored_keys() {
        let sample = sample();
        let (out, _, _) = run(
            sample.bytes,
            TraversalConfig::cmssw(),
            vec![Task::at(NodeKind::StreamAllKeys, 0)],
        );

        assert!(out.contains("Ignoring EventAuxiliary"));
        assert_eq!(out.matches("Key of length").count(), 3);
    }

    #[test]
    fn test_mismatch_clears_stack() {
        let mut file = FileBuilder::new();
        let good = file.key("TFile", "demo.root", "", b"data", 4);
        let fake = file.key_claiming(7, "TFile", "fake", "", b"data", 4);
        let bytes = file.finish(0);

        let (out, stats, outcome) = run(
            bytes,
            TraversalConfig::default(),
            vec![
                Task::at(NodeKind::KeyHeader, good),
                Task::at(NodeKind::KeyHeader, fake),
            ],
        );

        assert_eq!(outcome, RunOutcome::Drained);
        assert!(out.contains(&format!("{fake}: not a real record (self-reported position 7)")));
        assert!(out.contains(&format!("{fake:010}: ")));
        assert!(!out.contains("Key of length"));
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_mismatch_stops_stream() {
        let mut file = FileBuilder::new();
        file.key("TFile", "demo.root", "", b"data", 4);
        file.key_claiming(7, "TFile", "fake", "", b"data", 4);
        file.key("TTree", "Events", "", b"more data", 9);
        let bytes = file.finish(0);

        let (out, stats, _) = run(
            bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::StreamAllKeys, 0)],
        );

        assert_eq!(out.matches("Key of length").count(), 1);
        assert!(!out.contains("Events"));
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_probes_skip_silently() {
        let sample = sample();
        let first = sample.first;
        let probes = (first - 2..=first + 2)
            .rev()
            .map(|position| Task::at(NodeKind::KeyHeader, position).probe())
            .collect();

        let (out, stats, _) = run(sample.bytes, TraversalConfig::default(), probes);

        assert_eq!(out.matches("Key of length").count(), 1);
        assert!(out.contains(&format!("Object contents (starting at {}):", first + 43)));
        assert_eq!(stats.probes_rejected, 4);
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_range_scan_expands_lazily() {
        let sample = sample();
        let first = sample.first;
        let (out, stats, _) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::scan(NodeKind::KeyHeader, first - 2, first + 2)],
        );

        assert_eq!(out.matches("Key of length").count(), 1);
        assert!(out.contains(&format!("Object contents (starting at {}):", first + 43)));
        assert_eq!(stats.dispatched, 5);
        assert_eq!(stats.probes_rejected, 4);
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_range_scan_stops_at_end_of_input() {
        let input = Bytes::from(vec![0u8; 64]);
        let (out, stats, outcome) = run(
            input,
            TraversalConfig::default(),
            vec![Task::scan(NodeKind::KeyHeader, 61, u64::MAX)],
        );

        assert_eq!(outcome, RunOutcome::Drained);
        assert!(out.is_empty());
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.probes_rejected, 3);
    }

    #[test]
    fn test_oversized_key_checks_position_first() {
        let mut data = key_header(0x7fff_0000, 4, 7, "TFile", "x", "");
        data.extend_from_slice(b"data");

        let (out, stats, _) = run(
            Bytes::from(data),
            TraversalConfig::default(),
            vec![Task::at(NodeKind::KeyHeader, 0)],
        );

        assert!(out.starts_with("0: not a real record (self-reported position 7)\n"));
        assert!(out.contains("0000000000: "));
        assert!(!out.contains("truncated buffer"));
        assert!(!out.contains("Key of length"));
        assert_eq!(stats.refetches, 0);
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_streamer_catalog() {
        let sample = sample();
        let (out, stats, _) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::ListStreamerCatalog, 0)],
        );

        assert_eq!(stats.aborted, 0);
        assert!(out.contains("\"value\": \"StreamerInfo\""));
        assert!(out.contains("Streamer catalog with 2 entries:"));
        assert!(out.contains("Entry 0: TStreamerInfo"));
        assert!(out.contains("\"value\": \"Point\""));
        assert!(out.contains("  Element 0: TStreamerBasicType"));
        // Resolved through a class back-reference
        assert!(out.contains("  Element 1: TStreamerBasicType"));
        assert!(out.contains("\"value\": \"fY\""));
        assert!(out.contains("unsupported type 'TStreamerArtificial'"));
        assert!(out.contains("unsupported type 'TList'"));
    }

    #[test]
    fn test_file_header() {
        let sample = sample();
        let (out, _, _) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::FileHeader, 0)],
        );

        assert!(out.starts_with("File header:\n0000000000: 72 6f 6f 74"));
        assert!(out.contains("\"magic\": \"root\""));
        assert!(out.contains(&format!("\"fSeekInfo\": {}", sample.catalog)));
    }

    #[test]
    fn test_directories() {
        let zeros = Bytes::from(vec![0u8; 128]);
        let (out, stats, _) = run(
            zeros,
            TraversalConfig::default(),
            vec![
                Task::at(NodeKind::SubDirectory, 10),
                Task::at(NodeKind::TopDirectory, 0),
            ],
        );

        assert!(out.contains("TopDirHeader {"));
        assert!(out.contains("10: malformed sub-directory, fSeekDir is 0"));
        assert!(out.contains("SubDirHeader {"));
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_unknown_node_aborts() {
        let sample = sample();
        let (out, stats, _) = run(
            sample.bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::FileHeader, 0), Task::at(NodeKind::Unknown, 5)],
        );

        assert_eq!(out, "unknown node at position 5\n");
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_terminate() {
        let sample = sample();
        let mut machine = Machine::new(sample.bytes, Vec::new(), TraversalConfig::default());
        machine.push(Task::terminate());
        machine.push(Task::at(NodeKind::RawRange, 0).with_length(4));
        machine.push(Task::at(NodeKind::RawRange, 0).with_length(4));

        assert_eq!(machine.run().unwrap(), RunOutcome::Quit);
        assert_eq!(machine.pending(), 0);
        let out = String::from_utf8_lossy(machine.output()).into_owned();
        assert_eq!(out.matches("|root|").count(), 2);

        // The machine stays usable after quitting
        machine.push(Task::at(NodeKind::RawRange, 4).with_length(4));
        assert_eq!(machine.run().unwrap(), RunOutcome::Drained);
        assert_eq!(machine.stats().dispatched, 4);
    }

    #[test]
    fn test_truncated_key() {
        let mut file = FileBuilder::new();
        let at = file.key("TFile", "demo.root", "", &[1; 64], 64);
        let bytes = file.finish(0);
        let cut = bytes.slice(..bytes.len() - 10);

        let (out, stats, _) = run(
            cut,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::KeyHeader, at)],
        );
        assert!(out.contains(&format!("truncated buffer at offset {at}:")));
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_corrupt_payload() {
        let data = b"compressible ".repeat(20);
        let mut stored = zlib_block(&data);
        for b in &mut stored[9..] {
            *b = 0x55;
        }
        let mut file = FileBuilder::new();
        let at = file.key("TTree", "Events", "", &stored, data.len());
        let bytes = file.finish(0);

        let (out, stats, _) = run(
            bytes,
            TraversalConfig::default(),
            vec![Task::at(NodeKind::KeyHeader, at)],
        );
        assert!(out.contains("zlib decompression failed"));
        assert_eq!(stats.aborted, 1);
    }

    #[test]
    fn test_large_key_enlarges_window() {
        let payload = vec![7u8; 200_000];
        let mut file = FileBuilder::new();
        file.data.resize(70_000, 0);
        let at = file.key("TTree", "Big", "", &payload, payload.len());
        let bytes = file.finish(0);

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();
        tmp.flush().unwrap();
        let window =
            SlidingWindow::open(tmp.path(), &WindowConfig::new().window_size(MIN_WINDOW_SIZE))
                .unwrap();

        let config = TraversalConfig::default().key_dump_lines(Some(1));
        let mut machine = Machine::new(window, Vec::new(), config);
        machine.push(Task::at(NodeKind::KeyHeader, at));

        assert_eq!(machine.run().unwrap(), RunOutcome::Drained);
        assert_eq!(machine.stats().refetches, 1);
        assert_eq!(machine.stats().aborted, 0);
        assert_eq!(machine.source().remaps(), 2);
        let out = String::from_utf8_lossy(machine.output()).into_owned();
        assert!(out.contains(&format!("Hash: {}", Blake3Digest.hex_digest(&payload))));
    }
}
