//! Record layouts for the file formats the inspector understands.
//!
//! Catalogs are plain data: supporting a new record or format version means
//! adding a [`Layout`], never touching the resolution engine.

pub mod cmssw;
pub mod root;

use crate::layout::Layout;

/// Every named layout, for lookup by name
static ALL: &[&Layout] = &[
    &root::TSTRING,
    &root::TVERSION,
    &root::FILE_HEADER,
    &root::KEY_HEADER,
    &root::SUBDIR_HEADER,
    &root::TOP_DIR_HEADER,
    &root::TOBJECT,
    &root::TNAMED,
    &root::TLIST,
    &root::CLASS_TAG,
    &root::TOBJARRAY,
    &root::TSTREAMER_INFO,
    &root::TSTREAMER_ELEMENT,
    &root::TSTREAMER_BASE,
    &root::TSTREAMER_STRING,
    &root::TSTREAMER_BASIC_TYPE,
    &root::TSTREAMER_BASIC_POINTER,
    &root::TSTREAMER_OBJECT,
    &root::TSTREAMER_OBJECT_POINTER,
    &root::TSTREAMER_OBJECT_ANY,
    &root::TSTREAMER_STL,
    &root::COUNTED_BYTES,
    &cmssw::FILE_FORMAT_VERSION,
];

/// Find a layout by its name
pub fn lookup(name: &str) -> Option<&'static Layout> {
    ALL.iter().copied().find(|layout| layout.name == name)
}

/// Names of all known layouts
pub fn names() -> impl Iterator<Item = &'static str> {
    ALL.iter().map(|layout| layout.name)
}
