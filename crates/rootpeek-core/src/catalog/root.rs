//! Layouts of the core ROOT on-disk records.
//!
//! All numeric fields are big-endian. Records that come in a 32-bit and a
//! 64-bit flavour carry both sets of pointer fields, selected by a guard on
//! the record's version number.

use crate::layout::{Classification, Decoding, FieldSpec, Guard, Layout};

/// Byte counts carry this bit to distinguish them from class tags
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// Class tags referring back to an earlier class carry this bit
pub const CLASS_MASK: u32 = 0x8000_0000;

/// Class tag announcing a class name that was not seen before
pub const NEW_CLASS_TAG: u32 = 0xffff_ffff;

/// Offset added to buffer positions when recording class tags
pub const MAP_OFFSET: u32 = 2;

/// Key versions above this use 64-bit seek pointers
pub const LARGE_KEY_VERSION: i64 = 1000;

/// File versions at or above this use 64-bit seek pointers
pub const LARGE_FILE_VERSION: i64 = 1_000_000;

const SMALL_KEY: Guard = Guard::range("Version", 2, 0, LARGE_KEY_VERSION);
const LARGE_KEY: Guard = Guard::range("Version", 2, LARGE_KEY_VERSION + 1, i16::MAX as i64);
const SMALL_FILE: Guard = Guard::range("fVersion", 4, 0, LARGE_FILE_VERSION - 1);
const LARGE_FILE: Guard = Guard::range("fVersion", 4, LARGE_FILE_VERSION, i32::MAX as i64);

/// Length-prefixed string.
///
/// Lengths up to 254 use a single byte; a leading `0xff` announces a 4-byte
/// length.
pub static TSTRING: Layout = Layout {
    name: "TString",
    fields: &[
        FieldSpec::fixed("size", 1),
        FieldSpec::runtime("value", -1, 1)
            .class(Classification::Data)
            .when(Guard::range("size", 1, 0, 127)),
        FieldSpec::runtime("value", -1, 1)
            .class(Classification::Data)
            .when(Guard::range("size", 1, -128, -2)),
        FieldSpec::fixed("longSize", 4).when(Guard::equals("size", 1, -1)),
        FieldSpec::runtime("value", -4, 4)
            .class(Classification::Data)
            .when(Guard::equals("size", 1, -1)),
    ],
};

/// Byte count and version preceding every streamed object
pub static TVERSION: Layout = Layout {
    name: "TVersion",
    fields: &[
        FieldSpec::fixed("ByteCount", 4).decoded_as(Decoding::Hex),
        FieldSpec::fixed("value", 2).class(Classification::Data),
    ],
};

/// The file header found at offset 0
pub static FILE_HEADER: Layout = Layout {
    name: "FileHeader",
    fields: &[
        FieldSpec::fixed("magic", 4).decoded_as(Decoding::String),
        FieldSpec::fixed("fVersion", 4),
        FieldSpec::fixed("fBEGIN", 4),
        FieldSpec::fixed("fEND", 4).when(SMALL_FILE),
        FieldSpec::fixed("fEND", 8).when(LARGE_FILE),
        FieldSpec::fixed("fSeekFree", 4).when(SMALL_FILE),
        FieldSpec::fixed("fSeekFree", 8).when(LARGE_FILE),
        FieldSpec::fixed("fNbytesFree", 4),
        FieldSpec::fixed("nfree", 4),
        FieldSpec::fixed("fNbytesName", 4),
        FieldSpec::fixed("fUnits", 1),
        FieldSpec::fixed("fCompress", 4),
        FieldSpec::fixed("fSeekInfo", 4).when(SMALL_FILE),
        FieldSpec::fixed("fSeekInfo", 8).when(LARGE_FILE),
        FieldSpec::fixed("fNbytesInfo", 4),
        FieldSpec::fixed("fUUID", 18)
            .decoded_as(Decoding::Hex)
            .class(Classification::Mutable),
    ],
};

/// Header preceding every keyed record
pub static KEY_HEADER: Layout = Layout {
    name: "KeyHeader",
    fields: &[
        FieldSpec::fixed("Nbytes", 4),
        FieldSpec::fixed("Version", 2),
        FieldSpec::fixed("ObjLen", 4),
        FieldSpec::fixed("Datetime", 4)
            .decoded_as(Decoding::Datetime)
            .class(Classification::Mutable),
        FieldSpec::fixed("KeyLen", 2),
        FieldSpec::fixed("Cycle", 2),
        FieldSpec::fixed("SeekKey", 4).when(SMALL_KEY),
        FieldSpec::fixed("SeekPdir", 4).when(SMALL_KEY),
        FieldSpec::fixed("SeekKey", 8).when(LARGE_KEY),
        FieldSpec::fixed("SeekPdir", 8).when(LARGE_KEY),
        FieldSpec::embedded("ClassName", &TSTRING),
        FieldSpec::embedded("Name", &TSTRING).class(Classification::Key),
        FieldSpec::embedded("Title", &TSTRING).class(Classification::Key),
    ],
};

/// Sub-directory header
pub static SUBDIR_HEADER: Layout = Layout {
    name: "SubDirHeader",
    fields: &[
        FieldSpec::fixed("fModifiable", 1).class(Classification::Mutable),
        FieldSpec::fixed("fWritable", 1).class(Classification::Mutable),
        FieldSpec::fixed("fDatetimeC", 4)
            .decoded_as(Decoding::Datetime)
            .class(Classification::Mutable),
        FieldSpec::fixed("fDatetimeM", 4)
            .decoded_as(Decoding::Datetime)
            .class(Classification::Mutable),
        FieldSpec::fixed("fSeekDir", 4),
        FieldSpec::fixed("fNbytesKeys", 4),
        FieldSpec::fixed("fSeekParent", 4),
        FieldSpec::fixed("fSeekKeys", 4),
    ],
};

/// Top directory header, stored right after the file's first key
pub static TOP_DIR_HEADER: Layout = Layout {
    name: "TopDirHeader",
    fields: &[
        FieldSpec::fixed("Version", 2),
        FieldSpec::fixed("fDatetimeC", 4)
            .decoded_as(Decoding::Datetime)
            .class(Classification::Mutable),
        FieldSpec::fixed("fDatetimeM", 4)
            .decoded_as(Decoding::Datetime)
            .class(Classification::Mutable),
        FieldSpec::fixed("fNbytesKeys", 4),
        FieldSpec::fixed("fNbytesName", 4),
        FieldSpec::fixed("fSeekDir", 4).when(SMALL_KEY),
        FieldSpec::fixed("fSeekParent", 4).when(SMALL_KEY),
        FieldSpec::fixed("fSeekKeys", 4).when(SMALL_KEY),
        FieldSpec::fixed("fSeekDir", 8).when(LARGE_KEY),
        FieldSpec::fixed("fSeekParent", 8).when(LARGE_KEY),
        FieldSpec::fixed("fSeekKeys", 8).when(LARGE_KEY),
        FieldSpec::fixed("fUUID", 18).decoded_as(Decoding::Hex),
        FieldSpec::fixed("EXTRA", 12)
            .decoded_as(Decoding::Hex)
            .when(SMALL_KEY),
    ],
};

/// Base of every streamed object
pub static TOBJECT: Layout = Layout {
    name: "TObject",
    fields: &[
        FieldSpec::fixed("Version", 2),
        FieldSpec::fixed("fUniqueID", 4).decoded_as(Decoding::Hex),
        FieldSpec::fixed("fBits", 4).decoded_as(Decoding::Hex),
    ],
};

/// An object with a name and a title
pub static TNAMED: Layout = Layout {
    name: "TNamed",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Object", &TOBJECT),
        FieldSpec::embedded("Name", &TSTRING).class(Classification::Key),
        FieldSpec::embedded("Title", &TSTRING),
    ],
};

/// Header of a list; each item follows as a class tag, the object and an option string
pub static TLIST: Layout = Layout {
    name: "TList",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Object", &TOBJECT),
        FieldSpec::embedded("Name", &TSTRING),
        FieldSpec::fixed("nObjects", 4),
    ],
};

/// Byte count and class tag preceding a polymorphic object.
///
/// The class name is only written the first time a class appears in a
/// buffer; later occurrences carry a back-reference instead.
pub static CLASS_TAG: Layout = Layout {
    name: "ClassTag",
    fields: &[
        FieldSpec::fixed("ByteCount", 4).decoded_as(Decoding::Hex),
        FieldSpec::fixed("Tag", 4).decoded_as(Decoding::Hex),
        FieldSpec::delimited("Name").when(Guard::equals("Tag", 4, -1)),
    ],
};

/// Header of an object array; elements follow, each behind a class tag
pub static TOBJARRAY: Layout = Layout {
    name: "TObjArray",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Object", &TOBJECT),
        FieldSpec::embedded("Name", &TSTRING),
        FieldSpec::fixed("nObjects", 4),
        FieldSpec::fixed("lowerBound", 4),
    ],
};

/// Streamer description of one class, up to the header of its element array
pub static TSTREAMER_INFO: Layout = Layout {
    name: "TStreamerInfo",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Named", &TNAMED),
        FieldSpec::fixed("Checksum", 4).decoded_as(Decoding::Hex),
        FieldSpec::fixed("ClassVersion", 4),
        FieldSpec::embedded("ElementsTag", &CLASS_TAG),
        FieldSpec::embedded("Elements", &TOBJARRAY),
    ],
};

/// Fields shared by every streamer element
pub static TSTREAMER_ELEMENT: Layout = Layout {
    name: "TStreamerElement",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Named", &TNAMED),
        FieldSpec::fixed("type", 4),
        FieldSpec::fixed("size", 4),
        FieldSpec::fixed("length", 4),
        FieldSpec::fixed("dim", 4),
        FieldSpec::fixed("maxIndex", 20)
            .decoded_as(Decoding::Hex)
            .when(Guard::range("Version.value", 2, 2, i16::MAX as i64)),
        FieldSpec::embedded("typeName", &TSTRING),
    ],
};

/// A base class of the described class
pub static TSTREAMER_BASE: Layout = Layout {
    name: "TStreamerBase",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
        FieldSpec::fixed("baseVersion", 4)
            .when(Guard::range("Version.value", 2, 3, i16::MAX as i64)),
    ],
};

/// A string data member
pub static TSTREAMER_STRING: Layout = Layout {
    name: "TStreamerString",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
    ],
};

/// A data member of a basic type
pub static TSTREAMER_BASIC_TYPE: Layout = Layout {
    name: "TStreamerBasicType",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
    ],
};

/// A variable-length array of a basic type, sized by another member
pub static TSTREAMER_BASIC_POINTER: Layout = Layout {
    name: "TStreamerBasicPointer",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
        FieldSpec::fixed("countVersion", 4),
        FieldSpec::embedded("countName", &TSTRING),
        FieldSpec::embedded("countClass", &TSTRING),
    ],
};

/// An embedded object data member
pub static TSTREAMER_OBJECT: Layout = Layout {
    name: "TStreamerObject",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
    ],
};

/// A pointer to an object deriving from TObject
pub static TSTREAMER_OBJECT_POINTER: Layout = Layout {
    name: "TStreamerObjectPointer",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
    ],
};

/// An embedded object not deriving from TObject
pub static TSTREAMER_OBJECT_ANY: Layout = Layout {
    name: "TStreamerObjectAny",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
    ],
};

/// A standard library container data member
pub static TSTREAMER_STL: Layout = Layout {
    name: "TStreamerSTL",
    fields: &[
        FieldSpec::embedded("Version", &TVERSION),
        FieldSpec::embedded("Element", &TSTREAMER_ELEMENT),
        FieldSpec::fixed("stlType", 4),
        FieldSpec::fixed("cType", 4),
    ],
};

/// A byte array preceded by its 4-byte length
pub static COUNTED_BYTES: Layout = Layout {
    name: "CountedBytes",
    fields: &[
        FieldSpec::fixed("size", 4),
        FieldSpec::runtime("data", -4, 4)
            .decoded_as(Decoding::HexData)
            .class(Classification::Data),
    ],
};

/// Layout of a streamer element, by class name
pub fn streamer_element(class: &str) -> Option<&'static Layout> {
    let layout = match class {
        "TStreamerBase" => &TSTREAMER_BASE,
        "TStreamerString" => &TSTREAMER_STRING,
        "TStreamerBasicType" => &TSTREAMER_BASIC_TYPE,
        "TStreamerBasicPointer" => &TSTREAMER_BASIC_POINTER,
        "TStreamerObject" => &TSTREAMER_OBJECT,
        "TStreamerObjectPointer" => &TSTREAMER_OBJECT_POINTER,
        "TStreamerObjectAny" => &TSTREAMER_OBJECT_ANY,
        "TStreamerSTL" => &TSTREAMER_STL,
        _ => return None,
    };
    Some(layout)
}
