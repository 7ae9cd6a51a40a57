//! A layout bound to a position inside a buffer.

use super::resolve::{self, Value};
use super::{printer, Layout, PrinterConfig};
use crate::error::{Error, Result};
use std::borrow::Cow;

/// A [`Layout`] applied at an offset inside a byte buffer.
///
/// Views are cheap to copy and never own the bytes they describe. Every
/// accessor resolves against `bytes[offset..]`.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'b> {
    layout: &'static Layout,
    bytes: &'b [u8],
    offset: usize,
}

impl<'b> RecordView<'b> {
    /// Bind `layout` to the start of `bytes`
    pub fn new(layout: &'static Layout, bytes: &'b [u8]) -> Self {
        Self::at(layout, bytes, 0)
    }

    /// Bind `layout` to `bytes[offset..]`
    pub fn at(layout: &'static Layout, bytes: &'b [u8], offset: usize) -> Self {
        Self {
            layout,
            bytes,
            offset,
        }
    }

    /// The bound layout
    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Offset of the record inside the underlying buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes from the start of the record to the end of the buffer
    pub fn data(&self) -> &'b [u8] {
        self.bytes.get(self.offset..).unwrap_or_default()
    }

    /// Real size of the record
    pub fn real_size(&self) -> Result<usize> {
        resolve::real_size(self.layout, self.data())
    }

    /// Offset just past the record inside the underlying buffer
    pub fn end(&self) -> Result<usize> {
        Ok(self.offset + self.real_size()?)
    }

    /// Exactly the bytes covered by the record
    pub fn record_bytes(&self) -> Result<&'b [u8]> {
        let size = self.real_size()?;
        self.data()
            .get(..size)
            .ok_or_else(|| Error::truncated(self.offset, size, self.data().len()))
    }

    /// Bind `layout` immediately after this record
    pub fn next(&self, layout: &'static Layout) -> Result<RecordView<'b>> {
        Ok(Self::at(layout, self.bytes, self.end()?))
    }

    /// See [`resolve::resolve`]
    pub fn get(&self, path: &str) -> Result<Value<'b>> {
        resolve::resolve(self.layout, self.data(), path)
    }

    /// A nested record
    pub fn record(&self, path: &str) -> Result<RecordView<'b>> {
        match self.get(path)? {
            Value::Record(view) => Ok(view),
            _ => Err(Error::field_not_found(path)),
        }
    }

    /// See [`resolve::get_i8`]
    pub fn get_i8(&self, path: &str) -> Result<i8> {
        resolve::get_i8(self.layout, self.data(), path)
    }

    /// See [`resolve::get_u8`]
    pub fn get_u8(&self, path: &str) -> Result<u8> {
        resolve::get_u8(self.layout, self.data(), path)
    }

    /// See [`resolve::get_i16`]
    pub fn get_i16(&self, path: &str) -> Result<i16> {
        resolve::get_i16(self.layout, self.data(), path)
    }

    /// See [`resolve::get_i32`]
    pub fn get_i32(&self, path: &str) -> Result<i32> {
        resolve::get_i32(self.layout, self.data(), path)
    }

    /// See [`resolve::get_i64`]
    pub fn get_i64(&self, path: &str) -> Result<i64> {
        resolve::get_i64(self.layout, self.data(), path)
    }

    /// See [`resolve::get_unsigned`]
    pub fn get_unsigned(&self, path: &str) -> Result<u64> {
        resolve::get_unsigned(self.layout, self.data(), path)
    }

    /// See [`resolve::get_str`]
    pub fn get_str(&self, path: &str) -> Result<Cow<'b, str>> {
        resolve::get_str(self.layout, self.data(), path)
    }

    /// See [`resolve::get_bytes`]
    pub fn get_bytes(&self, path: &str) -> Result<&'b [u8]> {
        resolve::get_bytes(self.layout, self.data(), path)
    }

    /// Render the record with the default printer settings
    pub fn render(&self) -> Result<String> {
        printer::render(self.layout, self.data(), &PrinterConfig::default())
    }
}
