//! # rootpeek-core
//!
//! A library for inspecting ROOT binary container files record by record.
//!
//! This crate provides the core functionality for:
//! - Describing binary records declaratively and resolving fields by path
//! - Printing records and raw bytes in human-readable form
//! - Walking a file's keys, directories and streamer catalog as a task machine
//! - Reading arbitrarily large files through a sliding memory-mapped window
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`layout`]: Record layouts, field resolution and rendering
//! - [`catalog`]: Layouts of the ROOT records
//! - [`traversal`]: The task stack and its handlers
//! - [`window`]: Windowed access to the input file
//! - [`compress`]: Payload decompression
//! - [`digest`]: Payload digests
//! - [`command`]: Shell commands
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use rootpeek_core::{Command, Machine, SlidingWindow, TraversalConfig, WindowConfig};
//!
//! let window = SlidingWindow::open("events.root", &WindowConfig::default())?;
//! let mut machine = Machine::new(window, std::io::stdout(), TraversalConfig::default());
//!
//! if let Some(command) = Command::parse("listkeys")? {
//!     machine.push_all(command.tasks());
//!     machine.run()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`ByteSource`]: Serve input bytes from somewhere other than a file
//! - [`Codec`]: Decode additional compression formats
//! - [`DigestProvider`]: Hash payloads with another algorithm
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod catalog;
pub mod command;
pub mod compress;
pub mod digest;
pub mod dump;
pub mod error;
pub mod layout;
pub mod traversal;
pub mod window;

// Re-export primary types for convenience
pub use command::Command;
pub use compress::{Codec, CodecRegistry};
pub use digest::{Blake3Digest, DigestProvider};
pub use error::{Error, Result};
pub use layout::{FieldSpec, Layout, PrinterConfig, RecordView};
pub use traversal::{Machine, NodeKind, RunOutcome, Task, TraversalConfig};
pub use window::{ByteSource, SlidingWindow, WindowConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
