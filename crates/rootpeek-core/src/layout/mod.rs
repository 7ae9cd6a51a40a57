//! Declarative record layouts and the engine that interprets them.
//!
//! A [`Layout`] is an ordered list of [`FieldSpec`]s describing one binary
//! record. Layouts are plain data, usually authored as `static` items:
//!
//! ```
//! use rootpeek_core::layout::{FieldSpec, Guard, Layout};
//!
//! static STRING: Layout = Layout {
//!     name: "String",
//!     fields: &[
//!         FieldSpec::fixed("size", 1),
//!         FieldSpec::runtime("value", -1, 1),
//!     ],
//! };
//!
//! static RECORD: Layout = Layout {
//!     name: "Record",
//!     fields: &[
//!         FieldSpec::fixed("version", 2),
//!         FieldSpec::fixed("small", 4).when(Guard::range("version", 2, 0, 1000)),
//!         FieldSpec::fixed("large", 8).when(Guard::range("version", 2, 1001, i16::MAX as i64)),
//!         FieldSpec::embedded("title", &STRING),
//!     ],
//! };
//!
//! let buf = [0, 4, 0, 0, 0, 9, 2, b'h', b'i'];
//! assert_eq!(rootpeek_core::layout::get_i32(&RECORD, &buf, "small")?, 9);
//! assert_eq!(rootpeek_core::layout::get_str(&RECORD, &buf, "title.value")?, "hi");
//! assert_eq!(RECORD.real_size(&buf)?, 9);
//! # Ok::<(), rootpeek_core::Error>(())
//! ```
//!
//! Field offsets are never stored: each one is the sum of the real sizes of
//! the active fields before it, recomputed against the buffer at hand. The
//! end of the field slice terminates the layout; it is never matched by name.

pub mod decode;
mod printer;
mod resolve;
mod view;

use crate::error::Result;

pub use decode::{ByteOrder, PackedDatetime};
pub use printer::{render, LayoutPrinter, PrinterConfig};
pub use resolve::{
    get_bytes, get_f32, get_f64, get_i16, get_i32, get_i64, get_i8, get_str, get_u8,
    get_unsigned, locate, real_size, resolve, Located, Value,
};
pub use view::RecordView;

/// How many bytes a field occupies
#[derive(Debug, Clone, Copy)]
pub enum SizeRule {
    /// A literal byte count
    Fixed(usize),
    /// Byte count decoded from an integer elsewhere in the same buffer.
    ///
    /// `at` is relative to the start of this field; negative values point
    /// backwards, e.g. `-1` for a one byte length prefix.
    Runtime {
        /// Signed offset of the count, relative to the field start
        at: isize,
        /// Width of the count in bytes
        width: usize,
        /// Byte order of the count
        order: ByteOrder,
    },
    /// Extends up to and including the next zero byte
    Delimited,
    /// A nested layout applied at the current offset
    Embedded(&'static Layout),
}

/// Diffing semantics of a field. Never affects decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    /// Describes the file structure rather than the data
    #[default]
    Metadata,
    /// Expected to change from one file to another (UUIDs, timestamps)
    Mutable,
    /// Stable content
    Data,
    /// Identifies the record
    Key,
}

/// How a field's bytes are rendered and returned by [`resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// Signed integer of the field's width
    Scalar,
    /// Text, either fixed, runtime sized or zero delimited
    String,
    /// Short fixed-size byte list
    Hex,
    /// Opaque blob of runtime-computed size, dumped as hex and ASCII
    HexData,
    /// Nested layout
    Struct,
    /// Packed date-time bit-field
    Datetime,
}

/// Makes a field's presence depend on an integer elsewhere in the layout.
///
/// The referenced path is always resolved from the start of the layout that
/// owns the guarded field, never from the current position.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    /// Accessor path of the referenced field
    pub path: &'static str,
    /// Width of the referenced value (1, 2, 4 or 8 bytes, signed)
    pub width: usize,
    /// Inclusive lower bound
    pub begin: i64,
    /// Inclusive upper bound
    pub end: i64,
}

impl Guard {
    /// Active when `begin <= value <= end`
    pub const fn range(path: &'static str, width: usize, begin: i64, end: i64) -> Self {
        Self {
            path,
            width,
            begin,
            end,
        }
    }

    /// Active when the value equals `value`
    pub const fn equals(path: &'static str, width: usize, value: i64) -> Self {
        Self::range(path, width, value, value)
    }

    /// Whether a referenced value activates the guarded field
    pub fn admits(&self, value: i64) -> bool {
        (self.begin..=self.end).contains(&value)
    }
}

/// One entry of a [`Layout`]
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name, unique within the owning layout among fields that can be active together
    pub name: &'static str,
    /// Size rule
    pub size: SizeRule,
    /// Byte order used to decode numeric values
    pub order: ByteOrder,
    /// Diffing classification
    pub class: Classification,
    /// Decoding kind
    pub decoding: Decoding,
    /// Optional presence condition
    pub guard: Option<Guard>,
}

impl FieldSpec {
    const fn new(name: &'static str, size: SizeRule, decoding: Decoding) -> Self {
        Self {
            name,
            size,
            order: ByteOrder::Big,
            class: Classification::Metadata,
            decoding,
            guard: None,
        }
    }

    /// A big-endian scalar of `size` bytes
    pub const fn fixed(name: &'static str, size: usize) -> Self {
        Self::new(name, SizeRule::Fixed(size), Decoding::Scalar)
    }

    /// A string whose length is a big-endian count `at` bytes from the field start
    pub const fn runtime(name: &'static str, at: isize, width: usize) -> Self {
        Self::new(
            name,
            SizeRule::Runtime {
                at,
                width,
                order: ByteOrder::Big,
            },
            Decoding::String,
        )
    }

    /// A zero-terminated string
    pub const fn delimited(name: &'static str) -> Self {
        Self::new(name, SizeRule::Delimited, Decoding::String)
    }

    /// A nested record
    pub const fn embedded(name: &'static str, layout: &'static Layout) -> Self {
        Self::new(name, SizeRule::Embedded(layout), Decoding::Struct)
    }

    /// Decode numeric values least significant byte first
    pub const fn little_endian(self) -> Self {
        Self {
            order: ByteOrder::Little,
            ..self
        }
    }

    /// Byte order of a runtime size count
    pub const fn count_order(self, order: ByteOrder) -> Self {
        let size = match self.size {
            SizeRule::Runtime { at, width, .. } => SizeRule::Runtime { at, width, order },
            other => other,
        };
        Self { size, ..self }
    }

    /// Override the decoding kind
    pub const fn decoded_as(self, decoding: Decoding) -> Self {
        Self { decoding, ..self }
    }

    /// Override the classification
    pub const fn class(self, class: Classification) -> Self {
        Self { class, ..self }
    }

    /// Make the field conditional
    pub const fn when(self, guard: Guard) -> Self {
        Self {
            guard: Some(guard),
            ..self
        }
    }

    /// Nested layout of an embedded field
    pub fn nested(&self) -> Option<&'static Layout> {
        match self.size {
            SizeRule::Embedded(layout) => Some(layout),
            _ => None,
        }
    }

    /// Match the head of an accessor path against this field's name.
    ///
    /// Returns `Some(None)` when the path names this field exactly,
    /// `Some(Some(rest))` when it continues past this field with `.rest`,
    /// and `None` otherwise.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<Option<&'p str>> {
        let rest = path.strip_prefix(self.name)?;
        if rest.is_empty() {
            Some(None)
        } else {
            rest.strip_prefix('.').map(Some)
        }
    }
}

/// An ordered description of one binary record
#[derive(Debug)]
pub struct Layout {
    /// Mnemonic name, used in reports
    pub name: &'static str,
    /// Fields in on-disk order
    pub fields: &'static [FieldSpec],
}

impl Layout {
    /// Bytes covered by the leading run of fixed-size, unconditional fields.
    ///
    /// This needs no buffer, which makes it suitable for dumping records that
    /// failed to decode.
    pub fn static_prefix_size(&self) -> usize {
        self.fields
            .iter()
            .map_while(|field| match (field.size, field.guard) {
                (SizeRule::Fixed(n), None) => Some(n),
                _ => None,
            })
            .sum()
    }

    /// Real size of this layout applied to `buf`
    pub fn real_size(&'static self, buf: &[u8]) -> Result<usize> {
        real_size(self, buf)
    }

    /// Bind this layout to the start of `buf`
    pub fn view<'b>(&'static self, buf: &'b [u8]) -> RecordView<'b> {
        RecordView::new(self, buf)
    }
}
