//! Traversal configuration and the state shared between handlers.

use crate::catalog::cmssw;
use crate::layout::{Layout, PrinterConfig};

/// Mutable state shared by all handlers of a machine
#[derive(Debug, Clone, Default)]
pub struct TraversalContext {
    /// End of the used file space, from the file header's `fSeekFree`.
    ///
    /// Streaming stops before reaching it.
    pub seek_free: u64,
    /// Hexdump line budget for single-key dumps (`None` for no limit)
    pub dump_lines: Option<usize>,
}

/// Configuration for the traversal machine
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Keys with one of these names are skipped
    pub ignore_names: Vec<String>,
    /// Keys with one of these titles are skipped
    pub ignore_titles: Vec<String>,
    /// Payloads of keys with these names are rendered with a layout instead of hashed
    pub payload_layouts: Vec<(String, &'static Layout)>,
    /// Hexdump line budget for single-key dumps
    pub key_dump_lines: Option<usize>,
    /// Hexdump line budget while streaming keys (default: 10)
    pub stream_dump_lines: Option<usize>,
    /// Hexdump line budget for the streamer catalog key (default: 20)
    pub catalog_dump_lines: Option<usize>,
    /// Record rendering settings
    pub printer: PrinterConfig,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            ignore_names: Vec::new(),
            ignore_titles: Vec::new(),
            payload_layouts: Vec::new(),
            key_dump_lines: None,
            stream_dump_lines: Some(10),
            catalog_dump_lines: Some(20),
            printer: PrinterConfig::default(),
        }
    }
}

impl TraversalConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for files written by the CMS software framework.
    ///
    /// Skips the bulky provenance and auxiliary keys and renders the file
    /// format version.
    pub fn cmssw() -> Self {
        Self::default()
            .ignore_name("IdToParameterSetsBlobs")
            .ignore_name("LuminosityBlockAuxiliary")
            .ignore_name("EventAuxiliary")
            .ignore_title("MetaData")
            .ignore_title("Runs")
            .payload_layout("FileFormatVersion", &cmssw::FILE_FORMAT_VERSION)
    }

    /// Skip keys named `name`
    pub fn ignore_name(mut self, name: impl Into<String>) -> Self {
        self.ignore_names.push(name.into());
        self
    }

    /// Skip keys titled `title`
    pub fn ignore_title(mut self, title: impl Into<String>) -> Self {
        self.ignore_titles.push(title.into());
        self
    }

    /// Render payloads of keys named `name` with `layout`
    pub fn payload_layout(mut self, name: impl Into<String>, layout: &'static Layout) -> Self {
        self.payload_layouts.push((name.into(), layout));
        self
    }

    /// Sets the hexdump budget for single-key dumps
    pub fn key_dump_lines(mut self, lines: Option<usize>) -> Self {
        self.key_dump_lines = lines;
        self
    }

    /// Sets the hexdump budget while streaming
    pub fn stream_dump_lines(mut self, lines: Option<usize>) -> Self {
        self.stream_dump_lines = lines;
        self
    }

    /// Sets the record rendering settings
    pub fn printer(mut self, printer: PrinterConfig) -> Self {
        self.printer = printer;
        self
    }

    /// Whether a key with this name and title is skipped
    pub fn ignores(&self, name: &str, title: &str) -> bool {
        self.ignore_names.iter().any(|n| n == name) || self.ignore_titles.iter().any(|t| t == title)
    }

    /// Layout used for the payload of a key named `name`
    pub fn payload_layout_for(&self, name: &str) -> Option<&'static Layout> {
        self.payload_layouts
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, layout)| layout)
    }
}
