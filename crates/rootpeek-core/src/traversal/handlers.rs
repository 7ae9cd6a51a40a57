//! One handler per [`NodeKind`].

use super::streamer;
use super::task::{NodeKind, Task};
use super::{Env, Flow};
use crate::catalog::root::{FILE_HEADER, KEY_HEADER, SUBDIR_HEADER, TOP_DIR_HEADER};
use crate::dump::hexdump;
use crate::error::{Error, Result};
use crate::layout::RecordView;
use bytes::Bytes;
use std::borrow::Cow;
use std::io::Write;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMode {
    Dump,
    Stream,
    Hash,
    Catalog,
}

impl KeyMode {
    fn chains(self) -> bool {
        matches!(self, Self::Stream | Self::Hash)
    }
}

pub(super) fn dispatch<W: Write>(task: &Task, bytes: &[u8], env: &mut Env<'_, W>) -> Result<Flow> {
    match task.kind {
        NodeKind::FileHeader => file_header(task, bytes, env),
        NodeKind::KeyHeader => key(task, bytes, env, KeyMode::Dump),
        NodeKind::SubDirectory => subdir(task, bytes, env),
        NodeKind::TopDirectory => {
            env.render(&TOP_DIR_HEADER, bytes, 0)?;
            Ok(Flow::Continue)
        }
        NodeKind::StreamerCatalog => streamer::decode_catalog(task, bytes, env),
        NodeKind::RawRange => raw_range(task, bytes, env),
        NodeKind::StreamAllKeys => seed(bytes, env, "fBEGIN", NodeKind::DecodeOneKey),
        NodeKind::StreamAllHashes => seed(bytes, env, "fBEGIN", NodeKind::HashOneKey),
        NodeKind::ListStreamerCatalog => {
            seed(bytes, env, "fSeekInfo", NodeKind::StreamStreamerCatalog)
        }
        NodeKind::DecodeOneKey => key(task, bytes, env, KeyMode::Stream),
        NodeKind::HashOneKey => key(task, bytes, env, KeyMode::Hash),
        NodeKind::StreamStreamerCatalog => key(task, bytes, env, KeyMode::Catalog),
        NodeKind::Terminate => Ok(Flow::Quit),
        NodeKind::Unknown => Err(Error::UnknownNode {
            position: task.position(),
        }),
    }
}

fn file_header<W: Write>(task: &Task, bytes: &[u8], env: &mut Env<'_, W>) -> Result<Flow> {
    let size = FILE_HEADER.real_size(bytes)?;
    writeln!(env.out, "File header:")?;
    env.emit(&hexdump(&bytes[..size], task.position(), None))?;
    env.render(&FILE_HEADER, bytes, 0)?;
    Ok(Flow::Continue)
}

/// Read the file header, remember the end of used space and start a
/// traversal at the offset stored in `field`.
fn seed<W: Write>(bytes: &[u8], env: &mut Env<'_, W>, field: &str, next: NodeKind) -> Result<Flow> {
    let header = FILE_HEADER.view(bytes);
    let magic = header.get_str("magic")?;
    if magic != "root" {
        warn!(%magic, "File does not start with the ROOT magic");
    }

    env.context.seek_free = header.get_unsigned("fSeekFree")?;
    let start = header.get_unsigned(field)?;
    debug!(start, seek_free = env.context.seek_free, next = %next, "Starting from the file header");
    env.stack.push(Task::at(next, start));
    Ok(Flow::Continue)
}

fn mismatch(header: &RecordView<'_>, position: u64, bytes: &[u8]) -> Error {
    let reported = header.get_unsigned("SeekKey").unwrap_or_default();
    let shown = header
        .real_size()
        .unwrap_or_else(|_| KEY_HEADER.static_prefix_size())
        .min(bytes.len());
    Error::structural_mismatch(position, reported, hexdump(&bytes[..shown], position, None))
}

fn key<W: Write>(task: &Task, bytes: &[u8], env: &mut Env<'_, W>, mode: KeyMode) -> Result<Flow> {
    let position = task.position();
    let header = KEY_HEADER.view(bytes);
    let nbytes = header.get_i32("Nbytes")?;

    // Free segments carry their negated length in place of Nbytes
    if nbytes <= 0 {
        if !mode.chains() {
            return Err(mismatch(&header, position, bytes));
        }
        let gap = nbytes.unsigned_abs();
        if gap == 0 {
            warn!(position, "Zero-length key ends the stream");
            writeln!(env.out, "{position}: zero-length key, stopping")?;
        } else {
            debug!(position, gap, "Skipping free segment");
            writeln!(env.out, "Gap of {gap} bytes at {position}")?;
            env.push_next(task.kind, position + u64::from(gap));
        }
        return Ok(Flow::Continue);
    }

    // A key must point back at itself before its length is trusted
    match header.get_unsigned("SeekKey") {
        Ok(seek_key) if seek_key == position => {}
        _ => return Err(mismatch(&header, position, bytes)),
    }

    let nbytes = nbytes as usize;
    if nbytes > bytes.len() {
        return Ok(Flow::Refetch(nbytes));
    }
    if mode.chains() {
        env.push_next(task.kind, position + nbytes as u64);
    }

    let name = header.get_str("Name.value")?;
    let title = header.get_str("Title.value")?;
    if env.config.ignores(&name, &title) {
        writeln!(env.out, "Ignoring {name}")?;
        return Ok(Flow::Continue);
    }

    let key_len = header.get_unsigned("KeyLen")? as usize;
    let obj_len = header.get_unsigned("ObjLen")? as usize;
    let stored = bytes.get(key_len..nbytes).ok_or_else(|| {
        Error::truncated(
            key_len,
            nbytes.saturating_sub(key_len),
            bytes.len().saturating_sub(key_len),
        )
    })?;
    let payload = env.codecs.payload(stored, obj_len)?;

    if mode == KeyMode::Hash {
        writeln!(env.out, "Hash for {name}: {}", env.digest.hex_digest(&payload))?;
        return Ok(Flow::Continue);
    }

    writeln!(env.out, "Key of length {} found:", header.real_size()?)?;
    env.render(&KEY_HEADER, bytes, 0)?;
    let contents_at = position + key_len as u64;
    writeln!(env.out, "Object contents (starting at {contents_at}):")?;

    match env.config.payload_layout_for(&name) {
        Some(layout) => {
            env.render(layout, &payload, 0)?;
        }
        None => {
            writeln!(env.out, "Hash: {}", env.digest.hex_digest(&payload))?;
            let lines = match mode {
                KeyMode::Stream => env.config.stream_dump_lines,
                KeyMode::Catalog => env.config.catalog_dump_lines,
                _ => env.context.dump_lines,
            };
            // Decompressed payloads have no file position
            let base = match payload {
                Cow::Borrowed(_) => contents_at,
                Cow::Owned(_) => 0,
            };
            env.emit(&hexdump(&payload, base, lines))?;
        }
    }

    if mode == KeyMode::Catalog {
        let buffer = Bytes::from(payload.into_owned());
        env.stack
            .push(Task::in_buffer(NodeKind::StreamerCatalog, buffer).with_origin(key_len as u64));
    }
    Ok(Flow::Continue)
}

fn subdir<W: Write>(task: &Task, bytes: &[u8], env: &mut Env<'_, W>) -> Result<Flow> {
    let position = task.position();
    let header = SUBDIR_HEADER.view(bytes);
    let size = header.real_size()?;

    let seek_dir = header.get_unsigned("fSeekDir")?;
    if seek_dir != position {
        warn!(position, seek_dir, "Sub-directory does not point back to itself");
        writeln!(env.out, "{position}: malformed sub-directory, fSeekDir is {seek_dir}")?;
    }

    writeln!(env.out, "Sub-directory with contents:")?;
    env.emit(&hexdump(&bytes[..size], position, None))?;
    env.render(&SUBDIR_HEADER, bytes, 0)?;
    Ok(Flow::Continue)
}

fn raw_range<W: Write>(task: &Task, bytes: &[u8], env: &mut Env<'_, W>) -> Result<Flow> {
    let wanted = task.length.unwrap_or(bytes.len());
    let len = wanted.min(bytes.len());
    if len < wanted {
        writeln!(env.out, "Range cut to {len} bytes at the end of the input")?;
    }
    env.emit(&hexdump(&bytes[..len], task.position(), None))?;
    Ok(Flow::Continue)
}
