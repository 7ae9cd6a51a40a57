//! Hex and ASCII dumps of raw bytes.

use std::fmt::Write;

/// Bytes shown per dump line
pub const BYTES_PER_LINE: usize = 16;

/// Render `bytes` as lines of hex and printable ASCII.
///
/// Each line starts with the decimal position of its first byte, counted from
/// `base`. When `max_lines` is given and the dump is longer, the output is cut
/// there and a final `...` line notes how many bytes were left out.
pub fn hexdump(bytes: &[u8], base: u64, max_lines: Option<usize>) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        if max_lines.is_some_and(|max| line >= max) {
            let _ = writeln!(
                out,
                "... ({} more bytes)",
                bytes.len() - line * BYTES_PER_LINE
            );
            break;
        }
        write_line(&mut out, base + (line * BYTES_PER_LINE) as u64, chunk);
    }
    out
}

fn write_line(out: &mut String, position: u64, chunk: &[u8]) {
    let _ = write!(out, "{position:010}: ");
    for i in 0..BYTES_PER_LINE {
        match chunk.get(i) {
            Some(b) => {
                let _ = write!(out, "{b:02x} ");
            }
            None => out.push_str("   "),
        }
        if i == BYTES_PER_LINE / 2 - 1 {
            out.push(' ');
        }
    }
    out.push('|');
    out.extend(chunk.iter().map(|&b| {
        if b.is_ascii_graphic() || b == b' ' {
            b as char
        } else {
            '.'
        }
    }));
    out.push_str("|\n");
}
