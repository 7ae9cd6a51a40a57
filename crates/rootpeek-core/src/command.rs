//! Inspector shell commands.
//!
//! Each command line parses into a [`Command`], which expands into the
//! traversal tasks that carry it out. Offsets are decimal, or hexadecimal
//! with a `0x` prefix; ranges are written `begin:end`.

use crate::error::{Error, Result};
use crate::traversal::{NodeKind, Task};
use std::fmt::Write;

/// A parsed shell command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print every key of the file
    ListKeys,
    /// Print the payload digest of every key
    ListHashes,
    /// Decode the streamer catalog
    ListStreamerInfo,
    /// Decode one record
    Dump {
        /// Record type; unknown labels map to [`NodeKind::Unknown`]
        kind: NodeKind,
        /// File offset of the record
        position: u64,
    },
    /// Try to decode a record at every offset of an inclusive range
    Scan {
        /// Record type
        kind: NodeKind,
        /// First offset
        begin: u64,
        /// Last offset
        end: u64,
    },
    /// Hex dump a half-open range
    Examine {
        /// First offset
        begin: u64,
        /// End offset, excluded
        end: u64,
    },
    /// Show the command summary
    Help,
    /// Leave the inspector
    Quit,
}

struct Usage {
    name: &'static str,
    syntax: &'static str,
    summary: &'static str,
}

const USAGE: &[Usage] = &[
    Usage {
        name: "listkeys",
        syntax: "listkeys",
        summary: "print every key of the file",
    },
    Usage {
        name: "listhashes",
        syntax: "listhashes",
        summary: "print the payload digest of every key",
    },
    Usage {
        name: "liststreamerinfo",
        syntax: "liststreamerinfo",
        summary: "decode the streamer catalog",
    },
    Usage {
        name: "dump",
        syntax: "dump <type> <offset>",
        summary: "decode one record at an offset",
    },
    Usage {
        name: "scan",
        syntax: "scan <type> <begin>:<end>",
        summary: "try to decode a record at every offset of a range",
    },
    Usage {
        name: "examine",
        syntax: "examine <begin>:<end>",
        summary: "hex dump a byte range",
    },
    Usage {
        name: "help",
        syntax: "help",
        summary: "show this summary",
    },
    Usage {
        name: "quit",
        syntax: "quit",
        summary: "leave the inspector",
    },
];

fn usage_error(name: &str) -> Error {
    match USAGE.iter().find(|usage| usage.name == name) {
        Some(usage) => Error::invalid_command(format!("usage: {}", usage.syntax)),
        None => Error::invalid_command(format!("unknown command '{name}', try 'help'")),
    }
}

fn parse_offset(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| Error::invalid_command(format!("'{text}' is not an offset")))
}

fn parse_range(text: &str) -> Result<(u64, u64)> {
    let (begin, end) = text.split_once(':').ok_or_else(|| {
        Error::invalid_command(format!("'{text}' is not a range, expected <begin>:<end>"))
    })?;
    let (begin, end) = (parse_offset(begin)?, parse_offset(end)?);
    if end < begin {
        return Err(Error::invalid_command(format!("range {text} ends before it begins")));
    }
    Ok((begin, end))
}

impl Command {
    /// Parse one command line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("listkeys", []) => Self::ListKeys,
            ("listhashes", []) => Self::ListHashes,
            ("liststreamerinfo", []) => Self::ListStreamerInfo,
            ("help", []) => Self::Help,
            ("quit", []) => Self::Quit,
            ("dump", [label, offset]) => Self::Dump {
                kind: NodeKind::from_label(label).unwrap_or(NodeKind::Unknown),
                position: parse_offset(offset)?,
            },
            ("scan", [label, range]) => {
                let kind = NodeKind::from_label(label).ok_or_else(|| {
                    Error::invalid_command(format!("unknown record type '{label}'"))
                })?;
                let (begin, end) = parse_range(range)?;
                Self::Scan { kind, begin, end }
            }
            ("examine", [range]) => {
                let (begin, end) = parse_range(range)?;
                Self::Examine { begin, end }
            }
            _ => return Err(usage_error(name)),
        };
        Ok(Some(command))
    }

    /// Tasks carrying out the command, in push order
    pub fn tasks(&self) -> Vec<Task> {
        match *self {
            Self::ListKeys => vec![Task::at(NodeKind::StreamAllKeys, 0)],
            Self::ListHashes => vec![Task::at(NodeKind::StreamAllHashes, 0)],
            Self::ListStreamerInfo => vec![Task::at(NodeKind::ListStreamerCatalog, 0)],
            Self::Dump { kind, position } => vec![Task::at(kind, position)],
            Self::Scan { kind, begin, end } => vec![Task::scan(kind, begin, end)],
            Self::Examine { begin, end } => {
                vec![Task::at(NodeKind::RawRange, begin).with_length((end - begin) as usize)]
            }
            Self::Help => Vec::new(),
            Self::Quit => vec![Task::terminate()],
        }
    }

    /// Summary of all commands and record types
    pub fn help() -> String {
        let mut out = String::from("Commands:\n");
        for usage in USAGE {
            let _ = writeln!(out, "  {:<28}{}", usage.syntax, usage.summary);
        }
        let labels: Vec<_> = NodeKind::LABELLED.iter().map(|(label, _)| *label).collect();
        let _ = writeln!(out, "Record types: {}", labels.join(", "));
        out
    }

    /// Names of all commands, for completion
    pub fn names() -> impl Iterator<Item = &'static str> {
        USAGE.iter().map(|usage| usage.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::Source;
    use pretty_assertions::assert_eq;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("listkeys"), Command::ListKeys);
        assert_eq!(parse("  listhashes  "), Command::ListHashes);
        assert_eq!(parse("liststreamerinfo"), Command::ListStreamerInfo);
        assert_eq!(parse("help"), Command::Help);
        assert_eq!(parse("quit"), Command::Quit);
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_dump() {
        assert_eq!(
            parse("dump key 100"),
            Command::Dump {
                kind: NodeKind::KeyHeader,
                position: 100
            }
        );
        assert_eq!(
            parse("dump StreamerInfo 0x1f4"),
            Command::Dump {
                kind: NodeKind::StreamerCatalog,
                position: 500
            }
        );
        // Unknown types reach the machine and abort there
        assert_eq!(
            parse("dump basket 12"),
            Command::Dump {
                kind: NodeKind::Unknown,
                position: 12
            }
        );
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            parse("scan key 10:12"),
            Command::Scan {
                kind: NodeKind::KeyHeader,
                begin: 10,
                end: 12
            }
        );
        assert_eq!(parse("examine 0:64"), Command::Examine { begin: 0, end: 64 });
    }

    #[test]
    fn test_invalid_commands() {
        let cases = [
            ("frobnicate", "unknown command 'frobnicate'"),
            ("dump key", "usage: dump <type> <offset>"),
            ("listkeys now", "usage: listkeys"),
            ("dump key ten", "'ten' is not an offset"),
            ("scan basket 1:2", "unknown record type 'basket'"),
            ("examine 10", "not a range"),
            ("examine 10:5", "ends before it begins"),
        ];
        for (line, expected) in cases {
            let err = Command::parse(line).unwrap_err();
            assert!(matches!(err, Error::InvalidCommand(_)), "{line}");
            assert!(err.to_string().contains(expected), "{line}: {err}");
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_scan_tasks_run_in_order() {
        let tasks = parse("scan subdir 5:8").tasks();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].probe && tasks[0].kind == NodeKind::SubDirectory);

        let first = tasks.into_iter().next();
        let order: Vec<u64> = std::iter::successors(first, Task::scan_successor)
            .map(|task| task.position())
            .collect();
        assert_eq!(order, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_huge_scan_is_one_task() {
        let tasks = parse("scan key 0:0xffffffffff").tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].position(), 0);
        assert_eq!(tasks[0].scan_end, Some(0xff_ffff_ffff));
    }

    #[test]
    fn test_examine_task() {
        let tasks = parse("examine 16:48").tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, NodeKind::RawRange);
        assert_eq!(tasks[0].length, Some(32));
        assert!(matches!(tasks[0].source, Source::Offset(16)));
    }

    #[test]
    fn test_other_tasks() {
        assert_eq!(parse("listkeys").tasks()[0].kind, NodeKind::StreamAllKeys);
        assert_eq!(parse("quit").tasks()[0].kind, NodeKind::Terminate);
        assert!(parse("help").tasks().is_empty());
    }

    #[test]
    fn test_help_lists_everything() {
        let help = Command::help();
        for name in Command::names() {
            assert!(help.contains(name), "{name}");
        }
        assert!(help.contains("scan <type> <begin>:<end>"));
        assert!(help.contains("Record types: key, subdir, file, topdir, StreamerInfo"));
    }
}
