//! Decoding of the streamer catalog.
//!
//! The catalog is a list of `TStreamerInfo` objects, each describing one
//! class as an array of polymorphic streamer elements. Every polymorphic
//! object is preceded by a byte count and a class tag. The first occurrence
//! of a class in a buffer spells out its name; later ones refer back to the
//! position of that first tag. Entries whose class has no layout are reported
//! and skipped using their byte count.

use super::task::Task;
use super::{Env, Flow};
use crate::catalog::root::{
    self, BYTE_COUNT_MASK, CLASS_MASK, CLASS_TAG, MAP_OFFSET, NEW_CLASS_TAG, TLIST, TSTREAMER_INFO,
    TSTRING,
};
use crate::error::{Error, Result};
use crate::layout::decode::{read_uint, ByteOrder};
use crate::layout::{locate, RecordView};
use std::io::Write;
use tracing::{debug, trace};

/// Class names seen so far in one object buffer, keyed by back-reference
struct ClassMap {
    origin: u64,
    entries: Vec<(u64, String)>,
}

impl ClassMap {
    fn new(origin: u64) -> Self {
        Self {
            origin,
            entries: Vec::new(),
        }
    }

    /// Resolve the class tag of the object whose byte count sits at `tag.offset()`
    fn resolve(&mut self, tag: &RecordView<'_>) -> Result<String> {
        let at = tag.offset();
        let value = tag.get_unsigned("Tag")? as u32;

        if value == NEW_CLASS_TAG {
            let name = tag.get_str("Name")?.into_owned();
            // Back-references point at the tag word, after the byte count
            let reference = self.origin + (at + 4) as u64 + u64::from(MAP_OFFSET);
            trace!(%name, reference, "New class");
            self.entries.push((reference, name.clone()));
            return Ok(name);
        }

        if value & CLASS_MASK == 0 {
            return Err(Error::unsupported_type(format!("class tag {value:#x}"), at));
        }
        let reference = u64::from(value & !CLASS_MASK);
        self.entries
            .iter()
            .find(|(key, _)| *key == reference)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| Error::unsupported_type(format!("class reference {reference:#x}"), at))
    }
}

/// End of the object whose byte count sits at `at`, or `None` for a
/// reference or null pointer that occupies only the 4-byte word.
fn object_end(buf: &[u8], at: usize) -> Result<Option<usize>> {
    let word = read_uint(buf, at, 4, ByteOrder::Big)? as u32;
    if word & BYTE_COUNT_MASK == 0 {
        return Ok(None);
    }
    let end = at + 4 + (word & !BYTE_COUNT_MASK) as usize;
    if end > buf.len() {
        return Err(Error::truncated(at, end - at, buf.len() - at));
    }
    Ok(Some(end))
}

/// Print every class description of a streamer catalog held in `buf`
pub(super) fn decode_catalog<W: Write>(
    task: &Task,
    buf: &[u8],
    env: &mut Env<'_, W>,
) -> Result<Flow> {
    let list = TLIST.view(buf);
    let count = list.get_i32("nObjects")?;
    writeln!(env.out, "Streamer catalog with {count} entries:")?;
    env.render(&TLIST, buf, 0)?;

    let mut classes = ClassMap::new(task.origin);
    let mut cursor = list.end()?;
    for index in 0..count.max(0) {
        match object_end(buf, cursor)? {
            None => {
                writeln!(env.out, "Entry {index}: reference")?;
                cursor += 4;
            }
            Some(end) => {
                let tag = RecordView::at(&CLASS_TAG, buf, cursor);
                let decoded = classes.resolve(&tag).and_then(|class| {
                    if class != "TStreamerInfo" {
                        return Err(Error::unsupported_type(class, cursor));
                    }
                    writeln!(env.out, "Entry {index}: {class}")?;
                    // Bounded by the entry's byte count
                    decode_info(&buf[..end], tag.end()?, &mut classes, env)
                });
                match decoded {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => env.report(&err)?,
                    Err(err) => return Err(err),
                }
                cursor = end;
            }
        }
        // Each list entry is followed by its option string
        cursor = RecordView::at(&TSTRING, buf, cursor).end()?;
    }

    if cursor != buf.len() {
        debug!(cursor, len = buf.len(), "Streamer catalog has trailing bytes");
    }
    Ok(Flow::Continue)
}

/// Print one class description starting at `at` and its elements
fn decode_info<W: Write>(
    buf: &[u8],
    at: usize,
    classes: &mut ClassMap,
    env: &mut Env<'_, W>,
) -> Result<()> {
    let info = RecordView::at(&TSTREAMER_INFO, buf, at);
    env.render(&TSTREAMER_INFO, info.data(), 1)?;

    // Register the element array's class so later tags can refer to it
    let array_tag = at + locate(&TSTREAMER_INFO, info.data(), "ElementsTag")?.offset;
    classes.resolve(&RecordView::at(&CLASS_TAG, buf, array_tag))?;

    let count = info.get_i32("Elements.nObjects")?;
    let mut cursor = info.end()?;
    for index in 0..count.max(0) {
        let Some(end) = object_end(buf, cursor)? else {
            cursor += 4;
            continue;
        };

        let tag = RecordView::at(&CLASS_TAG, buf, cursor);
        let decoded = classes.resolve(&tag).and_then(|class| {
            let layout = root::streamer_element(&class)
                .ok_or_else(|| Error::unsupported_type(class.as_str(), cursor))?;
            let body = tag.end()?;
            let element = buf
                .get(body..end)
                .ok_or_else(|| Error::truncated(cursor, body - cursor, end - cursor))?;
            writeln!(env.out, "  Element {index}: {class}")?;
            env.render(layout, element, 2)?;
            Ok(())
        });
        match decoded {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => env.report(&err)?,
            Err(err) => return Err(err),
        }
        cursor = end;
    }
    Ok(())
}
