//! Human-readable rendering of records.
//!
//! Records print as a brace-delimited block of `"name": value` pairs,
//! one per active field, with nested layouts indented one level deeper:
//!
//! ```text
//! KeyHeader {
//!   "Nbytes": 143,
//!   "Datetime": 2016/3/14 15:09:26,
//!   "ClassName": TString {
//!     "size": 5,
//!     "value": "TFile"
//!   }
//! }
//! ```

use super::decode::{read_int, PackedDatetime};
use super::resolve::{text_of, Scope};
use super::{Decoding, FieldSpec, Layout};
use crate::dump::hexdump;
use crate::error::{Error, Result};
use std::fmt::Write;

/// Configuration for record rendering
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Maximum hexdump lines for opaque blobs (default: 8, `None` for all)
    pub max_dump_lines: Option<usize>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            max_dump_lines: Some(8),
        }
    }
}

impl PrinterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets the hexdump line budget for opaque blobs
    pub fn max_dump_lines(mut self, lines: Option<usize>) -> Self {
        self.max_dump_lines = lines;
        self
    }
}

/// Render the record described by `layout` at the start of `buf`
pub fn render(layout: &'static Layout, buf: &[u8], config: &PrinterConfig) -> Result<String> {
    let mut output = String::new();
    LayoutPrinter::new(&mut output, config).write_record(layout, buf)?;
    Ok(output)
}

/// Writes records to any [`std::fmt::Write`] sink
pub struct LayoutPrinter<'a, W: Write> {
    writer: &'a mut W,
    config: &'a PrinterConfig,
    indent_level: usize,
}

impl<'a, W: Write> LayoutPrinter<'a, W> {
    /// Creates a printer writing to `writer`
    pub fn new(writer: &'a mut W, config: &'a PrinterConfig) -> Self {
        Self {
            writer,
            config,
            indent_level: 0,
        }
    }

    /// Start every record `level` indentation steps deep
    pub fn with_indent_level(mut self, level: usize) -> Self {
        self.indent_level = level;
        self
    }

    /// Write one record followed by a newline and return its real size.
    ///
    /// The field sizes used to walk the record are the same ones the
    /// resolver computes, so the printed values always match the accessors.
    pub fn write_record(&mut self, layout: &'static Layout, buf: &[u8]) -> Result<usize> {
        self.write_indent()?;
        let size = self.write_block(layout, buf)?;
        writeln!(self.writer)?;
        Ok(size)
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            self.writer.write_str(&self.config.indent_str)?;
        }
        Ok(())
    }

    fn write_block(&mut self, layout: &'static Layout, buf: &[u8]) -> Result<usize> {
        write!(self.writer, "{} {{", layout.name)?;
        self.indent();

        let mut scope = Scope::new(layout, buf);
        let mut offset = 0;
        let mut first = true;

        for field in layout.fields {
            if !scope.is_active(field)? {
                continue;
            }
            self.writer.write_str(if first { "\n" } else { ",\n" })?;
            first = false;
            self.write_indent()?;
            write!(self.writer, "\"{}\": ", field.name)?;

            offset += match field.nested() {
                Some(nested) => {
                    let rest = buf
                        .get(offset..)
                        .ok_or_else(|| Error::truncated(offset, 0, 0))?;
                    self.write_block(nested, rest)?
                }
                None => {
                    let size = scope.field_size(field, offset)?;
                    self.write_value(field, &buf[offset..offset + size], offset)?;
                    size
                }
            };
        }

        self.dedent();
        if !first {
            writeln!(self.writer)?;
            self.write_indent()?;
        }
        write!(self.writer, "}}")?;
        Ok(offset)
    }

    fn write_value(&mut self, field: &FieldSpec, bytes: &[u8], offset: usize) -> Result<()> {
        match field.decoding {
            Decoding::Scalar if matches!(bytes.len(), 1 | 2 | 4 | 8) => {
                let value = read_int(bytes, 0, bytes.len(), field.order)?;
                write!(self.writer, "{value}")?;
            }
            Decoding::String => {
                let text = String::from_utf8_lossy(text_of(field, bytes));
                write!(self.writer, "\"{}\"", escape_string(&text))?;
            }
            Decoding::Datetime if bytes.len() == 4 => {
                let datetime = PackedDatetime::read(bytes, 0, field.order)?;
                write!(self.writer, "{datetime}")?;
            }
            Decoding::HexData => {
                write!(self.writer, "<{} bytes>", bytes.len())?;
                let dump = hexdump(bytes, offset as u64, self.config.max_dump_lines);
                self.indent();
                for line in dump.lines() {
                    writeln!(self.writer)?;
                    self.write_indent()?;
                    self.writer.write_str(line)?;
                }
                self.dedent();
            }
            _ => self.write_hex_list(bytes)?,
        }
        Ok(())
    }

    fn write_hex_list(&mut self, bytes: &[u8]) -> std::fmt::Result {
        self.writer.write_char('[')?;
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                self.writer.write_str(", ")?;
            }
            write!(self.writer, "0x{b:02x}")?;
        }
        self.writer.write_char(']')
    }
}

/// Escape a string for display inside double quotes
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                let _ = write!(result, "\\x{:02x}", c as u8);
            }
            _ => result.push(c),
        }
    }
    result
}
