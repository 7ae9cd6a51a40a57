//! Field resolution: offsets, sizes, guards and typed accessors.

use super::decode::{read_f32, read_f64, read_int, read_uint, strlen, ByteOrder, PackedDatetime};
use super::view::RecordView;
use super::{Decoding, FieldSpec, Layout, SizeRule};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ops::Range;

/// Where a field sits inside a buffer
#[derive(Debug, Clone, Copy)]
pub struct Located {
    /// The matched field
    pub field: &'static FieldSpec,
    /// Offset of the field from the start of the buffer passed to [`locate`]
    pub offset: usize,
    /// Real size of the field
    pub size: usize,
}

impl Located {
    /// Byte range covered by the field
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// A resolved field value
#[derive(Debug, Clone, Copy)]
pub enum Value<'b> {
    /// Sign-extended scalar
    Int(i64),
    /// String bytes, terminator excluded
    Text(&'b [u8]),
    /// Raw bytes
    Bytes(&'b [u8]),
    /// Packed datetime
    Datetime(PackedDatetime),
    /// A nested record bound to its bytes
    Record(RecordView<'b>),
}

impl<'b> Value<'b> {
    /// The integer value, if this is a scalar
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The text, if this is a string
    pub fn as_text(&self) -> Option<Cow<'b, str>> {
        match self {
            Self::Text(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }
}

/// One activation of a layout over a buffer.
///
/// Guard values are memoised for the lifetime of the scope so that sibling
/// fields sharing a guard path resolve it only once.
pub(crate) struct Scope<'b> {
    layout: &'static Layout,
    buf: &'b [u8],
    memo: Vec<(&'static str, usize, i64)>,
}

impl<'b> Scope<'b> {
    pub(crate) fn new(layout: &'static Layout, buf: &'b [u8]) -> Self {
        Self {
            layout,
            buf,
            memo: Vec::new(),
        }
    }

    /// Whether the field's guard, if any, admits it
    pub(crate) fn is_active(&mut self, field: &FieldSpec) -> Result<bool> {
        let Some(guard) = field.guard else {
            return Ok(true);
        };

        let cached = self
            .memo
            .iter()
            .find(|(path, width, _)| *path == guard.path && *width == guard.width)
            .map(|&(_, _, value)| value);

        let value = match cached {
            Some(value) => value,
            None => {
                let value = read_signed(self.layout, self.buf, guard.path, guard.width)?;
                self.memo.push((guard.path, guard.width, value));
                value
            }
        };
        Ok(guard.admits(value))
    }

    /// Real size of `field` when it starts at `offset`
    pub(crate) fn field_size(&self, field: &FieldSpec, offset: usize) -> Result<usize> {
        let available = self.buf.len().saturating_sub(offset);
        let size = match field.size {
            SizeRule::Fixed(n) => n,
            SizeRule::Delimited => strlen(self.buf, offset)? + 1,
            SizeRule::Runtime { at, width, order } => {
                let count_at = offset
                    .checked_add_signed(at)
                    .ok_or_else(|| Error::truncated(offset, width, 0))?;
                read_uint(self.buf, count_at, width, order)? as usize
            }
            SizeRule::Embedded(nested) => {
                let rest = self
                    .buf
                    .get(offset..)
                    .ok_or_else(|| Error::truncated(offset, 0, 0))?;
                real_size(nested, rest)?
            }
        };

        if size > available {
            return Err(Error::truncated(offset, size, available));
        }
        Ok(size)
    }
}

fn read_signed(layout: &'static Layout, buf: &[u8], path: &str, width: usize) -> Result<i64> {
    let (offset, order) = scalar_at(layout, buf, path, width)?;
    read_int(buf, offset, width, order)
}

fn scalar_at(
    layout: &'static Layout,
    buf: &[u8],
    path: &str,
    width: usize,
) -> Result<(usize, ByteOrder)> {
    let loc = locate(layout, buf, path)?;
    if loc.size != width {
        return Err(Error::wrong_size(path, width, loc.size));
    }
    Ok((loc.offset, loc.field.order))
}

/// Find the field named by a dotted accessor path.
///
/// Each path segment is matched against the active fields of the current
/// layout in order; a segment followed by `.` descends into the nested layout
/// of an embedded field.
pub fn locate(layout: &'static Layout, buf: &[u8], path: &str) -> Result<Located> {
    locate_from(layout, buf, 0, path, path)
}

fn locate_from(
    layout: &'static Layout,
    buf: &[u8],
    base: usize,
    path: &str,
    full: &str,
) -> Result<Located> {
    let view = buf
        .get(base..)
        .ok_or_else(|| Error::truncated(base, 0, 0))?;
    let mut scope = Scope::new(layout, view);
    let mut offset = 0;

    for field in layout.fields {
        if !scope.is_active(field)? {
            continue;
        }
        match field.match_path(path) {
            Some(None) => {
                let size = scope.field_size(field, offset)?;
                return Ok(Located {
                    field,
                    offset: base + offset,
                    size,
                });
            }
            Some(Some(rest)) => {
                return match field.nested() {
                    Some(nested) => locate_from(nested, buf, base + offset, rest, full),
                    None => Err(Error::field_not_found(full)),
                };
            }
            None => offset += scope.field_size(field, offset)?,
        }
    }

    Err(Error::field_not_found(full))
}

/// Total size of the active fields of `layout` applied to `buf`
pub fn real_size(layout: &'static Layout, buf: &[u8]) -> Result<usize> {
    let mut scope = Scope::new(layout, buf);
    layout.fields.iter().try_fold(0, |offset, field| {
        if scope.is_active(field)? {
            Ok(offset + scope.field_size(field, offset)?)
        } else {
            Ok(offset)
        }
    })
}

/// The text carried by a string field, terminator and fixed-size padding excluded
pub(crate) fn text_of<'b>(field: &FieldSpec, bytes: &'b [u8]) -> &'b [u8] {
    match field.size {
        SizeRule::Delimited => bytes.strip_suffix(&[0u8]).unwrap_or(bytes),
        SizeRule::Fixed(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            &bytes[..end]
        }
        _ => bytes,
    }
}

fn field_bytes<'b>(buf: &'b [u8], loc: &Located) -> Result<&'b [u8]> {
    buf.get(loc.range())
        .ok_or_else(|| Error::truncated(loc.offset, loc.size, buf.len().saturating_sub(loc.offset)))
}

/// Decode a field according to its decoding kind
pub fn resolve<'b>(layout: &'static Layout, buf: &'b [u8], path: &str) -> Result<Value<'b>> {
    let loc = locate(layout, buf, path)?;
    let bytes = field_bytes(buf, &loc)?;

    let value = match (loc.field.decoding, loc.field.nested()) {
        (_, Some(nested)) => Value::Record(RecordView::new(nested, bytes)),
        (Decoding::Scalar, None) if matches!(loc.size, 1 | 2 | 4 | 8) => {
            Value::Int(read_int(buf, loc.offset, loc.size, loc.field.order)?)
        }
        (Decoding::String, None) => Value::Text(text_of(loc.field, bytes)),
        (Decoding::Datetime, None) => {
            if loc.size != 4 {
                return Err(Error::wrong_size(path, 4, loc.size));
            }
            Value::Datetime(PackedDatetime::read(buf, loc.offset, loc.field.order)?)
        }
        _ => Value::Bytes(bytes),
    };
    Ok(value)
}

/// Decode a one byte signed scalar
pub fn get_i8(layout: &'static Layout, buf: &[u8], path: &str) -> Result<i8> {
    Ok(read_signed(layout, buf, path, 1)? as i8)
}

/// Decode a one byte unsigned scalar
pub fn get_u8(layout: &'static Layout, buf: &[u8], path: &str) -> Result<u8> {
    let (offset, order) = scalar_at(layout, buf, path, 1)?;
    Ok(read_uint(buf, offset, 1, order)? as u8)
}

/// Decode a two byte signed scalar
pub fn get_i16(layout: &'static Layout, buf: &[u8], path: &str) -> Result<i16> {
    Ok(read_signed(layout, buf, path, 2)? as i16)
}

/// Decode a four byte signed scalar
pub fn get_i32(layout: &'static Layout, buf: &[u8], path: &str) -> Result<i32> {
    Ok(read_signed(layout, buf, path, 4)? as i32)
}

/// Decode an eight byte signed scalar
pub fn get_i64(layout: &'static Layout, buf: &[u8], path: &str) -> Result<i64> {
    read_signed(layout, buf, path, 8)
}

/// Decode a four byte float
pub fn get_f32(layout: &'static Layout, buf: &[u8], path: &str) -> Result<f32> {
    let (offset, order) = scalar_at(layout, buf, path, 4)?;
    read_f32(buf, offset, order)
}

/// Decode an eight byte float
pub fn get_f64(layout: &'static Layout, buf: &[u8], path: &str) -> Result<f64> {
    let (offset, order) = scalar_at(layout, buf, path, 8)?;
    read_f64(buf, offset, order)
}

/// Decode an unsigned scalar of whatever width the active field has.
///
/// Used for fields whose width is selected by a guard, such as seek
/// pointers that are 4 bytes in small files and 8 bytes in large ones.
pub fn get_unsigned(layout: &'static Layout, buf: &[u8], path: &str) -> Result<u64> {
    let loc = locate(layout, buf, path)?;
    if !matches!(loc.size, 1 | 2 | 4 | 8) {
        return Err(Error::wrong_size(path, 8, loc.size));
    }
    read_uint(buf, loc.offset, loc.size, loc.field.order)
}

/// The text of a string field, lossily converted to UTF-8
pub fn get_str<'b>(layout: &'static Layout, buf: &'b [u8], path: &str) -> Result<Cow<'b, str>> {
    let loc = locate(layout, buf, path)?;
    let bytes = field_bytes(buf, &loc)?;
    Ok(String::from_utf8_lossy(text_of(loc.field, bytes)))
}

/// The raw bytes of any field
pub fn get_bytes<'b>(layout: &'static Layout, buf: &'b [u8], path: &str) -> Result<&'b [u8]> {
    let loc = locate(layout, buf, path)?;
    field_bytes(buf, &loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Guard;

    static LITTLE: Layout = Layout {
        name: "LittleStruct",
        fields: &[
            FieldSpec::fixed("aChar", 1).little_endian(),
            FieldSpec::fixed("aShort", 2).little_endian(),
            FieldSpec::fixed("anInt", 4).little_endian(),
            FieldSpec::fixed("aLong", 8).little_endian(),
        ],
    };

    static BIG: Layout = Layout {
        name: "BigStruct",
        fields: &[
            FieldSpec::fixed("aChar", 1),
            FieldSpec::fixed("aShort", 2),
            FieldSpec::fixed("anInt", 4),
            FieldSpec::fixed("aLong", 8),
        ],
    };

    static A_STRING: Layout = Layout {
        name: "AString",
        fields: &[FieldSpec::delimited("aString")],
    };

    static A_STRUCT: Layout = Layout {
        name: "AStruct",
        fields: &[
            FieldSpec::embedded("Little", &LITTLE),
            FieldSpec::embedded("Big", &BIG),
            FieldSpec::embedded("AString", &A_STRING),
        ],
    };

    static SMALL: Layout = Layout {
        name: "SmallStruct",
        fields: &[FieldSpec::fixed("aChar", 1)],
    };

    static B_STRUCT: Layout = Layout {
        name: "BStruct",
        fields: &[
            FieldSpec::embedded("aStruct", &A_STRUCT),
            FieldSpec::embedded("A", &SMALL),
        ],
    };

    static SMALL_COMPOSED: Layout = Layout {
        name: "SmallComposedStruct",
        fields: &[
            FieldSpec::embedded("A", &SMALL),
            FieldSpec::embedded("B", &SMALL),
        ],
    };

    fn some_struct() -> Vec<u8> {
        let mut buf = vec![1, 2, 0, 3, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
        buf.extend_from_slice(&[5, 0, 6, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 8]);
        buf.extend_from_slice(b"foo\0");
        buf.push(127);
        buf
    }

    #[test]
    fn test_scalars_both_orders() {
        let buf = some_struct();
        assert_eq!(get_i8(&A_STRUCT, &buf, "Little.aChar").unwrap(), 1);
        assert_eq!(get_i16(&A_STRUCT, &buf, "Little.aShort").unwrap(), 2);
        assert_eq!(get_i32(&A_STRUCT, &buf, "Little.anInt").unwrap(), 3);
        assert_eq!(get_i64(&A_STRUCT, &buf, "Little.aLong").unwrap(), 4);
        assert_eq!(get_i8(&A_STRUCT, &buf, "Big.aChar").unwrap(), 5);
        assert_eq!(get_i16(&A_STRUCT, &buf, "Big.aShort").unwrap(), 6);
        assert_eq!(get_i32(&A_STRUCT, &buf, "Big.anInt").unwrap(), 7);
        assert_eq!(get_i64(&A_STRUCT, &buf, "Big.aLong").unwrap(), 8);
    }

    #[test]
    fn test_real_size_and_strings() {
        let buf = some_struct();
        assert_eq!(real_size(&A_STRUCT, &buf).unwrap(), buf.len() - 1);
        assert_eq!(get_str(&A_STRUCT, &buf, "AString.aString").unwrap(), "foo");
    }

    #[test]
    fn test_nested_paths() {
        let buf = some_struct();
        assert_eq!(get_str(&B_STRUCT, &buf, "aStruct.AString.aString").unwrap(), "foo");
        assert_eq!(get_i8(&B_STRUCT, &buf, "A.aChar").unwrap(), 127);
        assert_eq!(real_size(&B_STRUCT, &buf).unwrap(), buf.len());

        let loc = locate(&B_STRUCT, &buf, "A.aChar").unwrap();
        assert_eq!(loc.offset, buf.len() - 1);
        assert_eq!(loc.size, 1);
    }

    #[test]
    fn test_same_layout_embedded_twice() {
        let buf = [1u8, 2];
        assert_eq!(get_i8(&SMALL_COMPOSED, &buf, "A.aChar").unwrap(), 1);
        assert_eq!(get_i8(&SMALL_COMPOSED, &buf, "B.aChar").unwrap(), 2);
    }

    #[test]
    fn test_wrong_size() {
        let buf = some_struct();
        let err = get_i32(&A_STRUCT, &buf, "Big.aShort").unwrap_err();
        assert!(matches!(
            err,
            Error::WrongSize {
                requested: 4,
                declared: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_field_not_found() {
        let buf = some_struct();
        for path in ["Little.nothing", "Nothing", "Big.aChar.deeper", "Littl"] {
            let err = locate(&A_STRUCT, &buf, path).unwrap_err();
            assert!(
                matches!(&err, Error::FieldNotFound { path: p } if p == path),
                "{path}: {err}"
            );
        }
    }

    static CONDITIONAL: Layout = Layout {
        name: "CStruct",
        fields: &[
            FieldSpec::fixed("dummy", 1),
            FieldSpec::fixed("version", 1),
            FieldSpec::fixed("a2", 4).when(Guard::equals("version", 1, 2)),
            FieldSpec::fixed("a1", 2).when(Guard::equals("version", 1, 1)),
            FieldSpec::fixed("c", 1),
        ],
    };

    #[test]
    fn test_equality_guards() {
        let v1 = [0, 1, 0, 9, 7];
        assert_eq!(get_i16(&CONDITIONAL, &v1, "a1").unwrap(), 9);
        assert_eq!(get_i8(&CONDITIONAL, &v1, "c").unwrap(), 7);
        assert_eq!(real_size(&CONDITIONAL, &v1).unwrap(), 5);
        assert!(matches!(
            get_i32(&CONDITIONAL, &v1, "a2"),
            Err(Error::FieldNotFound { .. })
        ));

        let v2 = [0, 2, 0, 0, 0, 10, 7];
        assert_eq!(get_i32(&CONDITIONAL, &v2, "a2").unwrap(), 10);
        assert_eq!(get_i8(&CONDITIONAL, &v2, "c").unwrap(), 7);
        assert_eq!(real_size(&CONDITIONAL, &v2).unwrap(), 7);
        assert!(locate(&CONDITIONAL, &v2, "a1").is_err());
    }

    static WIDE_GUARDS: Layout = Layout {
        name: "WideGuards",
        fields: &[
            FieldSpec::fixed("v2", 2),
            FieldSpec::fixed("v4", 4),
            FieldSpec::fixed("v8", 8),
            FieldSpec::fixed("short", 1).when(Guard::equals("v2", 2, 513)),
            FieldSpec::fixed("int", 1).when(Guard::equals("v4", 4, -2)),
            FieldSpec::fixed("long", 1).when(Guard::equals("v8", 8, 1 << 40)),
        ],
    };

    #[test]
    fn test_wide_guards() {
        let mut buf = vec![2, 1];
        buf.extend_from_slice(&(-2i32).to_be_bytes());
        buf.extend_from_slice(&(1i64 << 40).to_be_bytes());
        buf.extend_from_slice(&[11, 12, 13]);

        assert_eq!(get_i8(&WIDE_GUARDS, &buf, "short").unwrap(), 11);
        assert_eq!(get_i8(&WIDE_GUARDS, &buf, "int").unwrap(), 12);
        assert_eq!(get_i8(&WIDE_GUARDS, &buf, "long").unwrap(), 13);
        assert_eq!(real_size(&WIDE_GUARDS, &buf).unwrap(), buf.len());
    }

    static RANGE_GUARDS: Layout = Layout {
        name: "RangeGuards",
        fields: &[
            FieldSpec::fixed("version", 1),
            FieldSpec::fixed("high", 2).when(Guard::range("version", 1, 6, 10)),
            FieldSpec::fixed("low", 4).when(Guard::range("version", 1, 0, 5)),
        ],
    };

    #[test]
    fn test_range_guards() {
        for version in [6u8, 8, 10] {
            let buf = [version, 0, 3];
            assert_eq!(get_i16(&RANGE_GUARDS, &buf, "high").unwrap(), 3);
            assert!(locate(&RANGE_GUARDS, &buf, "low").is_err());
        }
        for version in [0u8, 5] {
            let buf = [version, 0, 0, 0, 4];
            assert_eq!(get_i32(&RANGE_GUARDS, &buf, "low").unwrap(), 4);
            assert!(locate(&RANGE_GUARDS, &buf, "high").is_err());
        }
        // Neither branch
        assert_eq!(real_size(&RANGE_GUARDS, &[11]).unwrap(), 1);
    }

    static VERSION: Layout = Layout {
        name: "Version",
        fields: &[FieldSpec::fixed("aInt", 4)],
    };

    static NESTED_GUARD: Layout = Layout {
        name: "NestedGuard",
        fields: &[
            FieldSpec::embedded("version", &VERSION),
            FieldSpec::fixed("three", 1).when(Guard::equals("version.aInt", 4, 3)),
            FieldSpec::fixed("other", 2).when(Guard::range("version.aInt", 4, 4, i64::MAX)),
        ],
    };

    #[test]
    fn test_nested_guard_path() {
        let buf = [0, 0, 0, 3, 42];
        assert_eq!(get_i8(&NESTED_GUARD, &buf, "three").unwrap(), 42);
        let buf = [0, 0, 0, 4, 0, 42];
        assert_eq!(get_i16(&NESTED_GUARD, &buf, "other").unwrap(), 42);
        assert_eq!(real_size(&NESTED_GUARD, &buf).unwrap(), 6);
    }

    static FLOATS: Layout = Layout {
        name: "Floats",
        fields: &[
            FieldSpec::fixed("single", 4).little_endian(),
            FieldSpec::fixed("double", 8),
        ],
    };

    #[test]
    fn test_floats() {
        let mut buf = 2.75f32.to_le_bytes().to_vec();
        buf.extend_from_slice(&(-0.5f64).to_be_bytes());
        assert_eq!(get_f32(&FLOATS, &buf, "single").unwrap(), 2.75);
        assert_eq!(get_f64(&FLOATS, &buf, "double").unwrap(), -0.5);
        assert!(get_f64(&FLOATS, &buf, "single").is_err());
    }

    static T_STRING: Layout = Layout {
        name: "TString",
        fields: &[
            FieldSpec::fixed("size", 1),
            FieldSpec::runtime("value", -1, 1),
        ],
    };

    static FIXED_STRING: Layout = Layout {
        name: "FixedString",
        fields: &[FieldSpec::fixed("value", 3).decoded_as(Decoding::String)],
    };

    static ZERO_STRING: Layout = Layout {
        name: "ZeroString",
        fields: &[FieldSpec::delimited("value")],
    };

    #[test]
    fn test_string_forms() {
        let buf = [3, b'f', b'o', b'o'];
        assert_eq!(get_str(&T_STRING, &buf, "value").unwrap(), "foo");
        assert_eq!(real_size(&T_STRING, &buf).unwrap(), 4);

        assert_eq!(get_str(&FIXED_STRING, b"foo", "value").unwrap(), "foo");
        assert_eq!(real_size(&FIXED_STRING, b"foo").unwrap(), 3);

        assert_eq!(get_str(&ZERO_STRING, b"foo\0", "value").unwrap(), "foo");
        assert_eq!(real_size(&ZERO_STRING, b"foo\0").unwrap(), 4);
    }

    #[test]
    fn test_truncated_runtime_size() {
        let buf = [9, b'f', b'o'];
        assert!(matches!(
            real_size(&T_STRING, &buf),
            Err(Error::Truncated { needed: 9, .. })
        ));
        assert!(real_size(&ZERO_STRING, b"foo").is_err());
    }

    #[test]
    fn test_resolve_values() {
        let buf = some_struct();
        assert_eq!(resolve(&A_STRUCT, &buf, "Big.anInt").unwrap().as_int(), Some(7));
        assert_eq!(
            resolve(&A_STRUCT, &buf, "AString.aString")
                .unwrap()
                .as_text()
                .as_deref(),
            Some("foo")
        );
        match resolve(&B_STRUCT, &buf, "aStruct.Big").unwrap() {
            Value::Record(view) => {
                assert_eq!(view.layout().name, "BigStruct");
                assert_eq!(view.get_i64("aLong").unwrap(), 8);
            }
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn test_get_unsigned_follows_active_width() {
        static SEEK: Layout = Layout {
            name: "Seek",
            fields: &[
                FieldSpec::fixed("Version", 2),
                FieldSpec::fixed("SeekKey", 4).when(Guard::range("Version", 2, 0, 1000)),
                FieldSpec::fixed("SeekKey", 8).when(Guard::range("Version", 2, 1001, 32767)),
            ],
        };

        let small = [0, 4, 0, 0, 0, 100];
        assert_eq!(get_unsigned(&SEEK, &small, "SeekKey").unwrap(), 100);

        let mut large = 1004u16.to_be_bytes().to_vec();
        large.extend_from_slice(&(5u64 << 32).to_be_bytes());
        assert_eq!(get_unsigned(&SEEK, &large, "SeekKey").unwrap(), 5 << 32);
    }
}
