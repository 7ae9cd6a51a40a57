//! Layouts of records written by the CMS software framework.

use crate::layout::{FieldSpec, Layout};

/// Payload of the `FileFormatVersion` key
pub static FILE_FORMAT_VERSION: Layout = Layout {
    name: "FileFormatVersion",
    fields: &[
        FieldSpec::fixed("value", 4),
        FieldSpec::fixed("unknown1", 4),
        FieldSpec::fixed("unknown2", 4),
        FieldSpec::fixed("unknown3", 4),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::get_i32;

    #[test]
    fn test_file_format_version() {
        let mut buf = 17i32.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0; 12]);
        assert_eq!(get_i32(&FILE_FORMAT_VERSION, &buf, "value").unwrap(), 17);
        assert_eq!(FILE_FORMAT_VERSION.static_prefix_size(), 16);
    }
}
