//! rootpeek - Inspect ROOT binary container files record by record
//!
//! This tool opens a ROOT file through a sliding memory-mapped window and
//! decodes its keys, directories and streamer catalog, either from an
//! interactive prompt or from a batch of commands given on the command line.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use rootpeek_core::window::DEFAULT_WINDOW_SIZE;
use rootpeek_core::{
    catalog, ByteSource, Command, Layout, Machine, RunOutcome, SlidingWindow, TraversalConfig,
    WindowConfig,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect ROOT binary container files record by record
#[derive(Parser, Debug)]
#[command(name = "rootpeek")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Command to run instead of starting the prompt (repeatable, run in order)
    #[arg(short, long = "command", value_name = "COMMAND")]
    commands: Vec<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Size of the memory-mapped window in bytes (a power of two)
    #[arg(long, env = "ROOTPEEK_WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Skip keys with this name (repeatable)
    #[arg(long, value_name = "NAME")]
    ignore: Vec<String>,

    /// Skip CMSSW bookkeeping keys and decode their format version record
    #[arg(long)]
    cmssw: bool,

    /// Maximum hex dump lines per key payload (0 = unlimited)
    #[arg(long, value_name = "LINES")]
    dump_lines: Option<usize>,

    /// Render payloads of the named key with a known layout (repeatable)
    #[arg(long, value_name = "KEY=LAYOUT", value_parser = parse_payload_layout)]
    payload: Vec<(String, &'static Layout)>,
}

/// Parse a `KEY=LAYOUT` pair against the layout catalog
fn parse_payload_layout(arg: &str) -> std::result::Result<(String, &'static Layout), String> {
    let (key, name) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=LAYOUT, got '{arg}'"))?;
    let layout = catalog::lookup(name).ok_or_else(|| {
        let known: Vec<_> = catalog::names().collect();
        format!("unknown layout '{name}', expected one of: {}", known.join(", "))
    })?;
    Ok((key.to_string(), layout))
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single ROOT file to inspect
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of ROOT files to run the commands on
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Whether the inspector should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Traversal settings from the command line
fn traversal_config(cli: &Cli) -> TraversalConfig {
    let mut config = if cli.cmssw {
        TraversalConfig::cmssw()
    } else {
        TraversalConfig::new()
    };
    for name in &cli.ignore {
        config = config.ignore_name(name.as_str());
    }
    for (key, layout) in &cli.payload {
        config = config.payload_layout(key.as_str(), *layout);
    }
    if let Some(lines) = cli.dump_lines {
        let lines = (lines > 0).then_some(lines);
        config = config.key_dump_lines(lines).stream_dump_lines(lines);
    }
    config
}

/// Open a file behind a fresh machine writing to stdout
fn open_machine(cli: &Cli, file: &Path) -> Result<Machine<SlidingWindow, io::Stdout>> {
    let window_config = WindowConfig::new().window_size(cli.window_size);
    let window = SlidingWindow::open(file, &window_config)
        .with_context(|| format!("Failed to open input file: {}", file.display()))?;
    debug!(
        "Opened {} ({} bytes, {} byte window)",
        file.display(),
        window.len(),
        cli.window_size
    );
    Ok(Machine::new(window, io::stdout(), traversal_config(cli)))
}

/// Inspect a single file, interactively unless commands were given
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut machine = open_machine(cli, file)?;
    if cli.commands.is_empty() {
        interactive(&mut machine, file)?;
    } else {
        run_batch(&mut machine, &cli.commands)?;
    }

    let stats = machine.stats();
    info!(
        "Summary: {} tasks dispatched, {} branches aborted, {} probes rejected, {} refetches",
        stats.dispatched, stats.aborted, stats.probes_rejected, stats.refetches
    );
    Ok(())
}

/// Run the batch commands on every ROOT file below a directory
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }
    if cli.commands.is_empty() {
        bail!("--directory needs at least one --command");
    }

    info!("Scanning directory: {}", directory.display());

    let files = root_files(directory);
    for file in &files {
        println!("==> {} <==", file.display());
        let outcome =
            open_machine(cli, file).and_then(|mut machine| run_batch(&mut machine, &cli.commands));
        if let Err(e) = outcome {
            // Log error but continue with other files
            warn!("Error processing {}: {:#}", file.display(), e);
        }
    }

    info!("Processed {} files", files.len());
    Ok(())
}

/// ROOT files below `directory`, skipping hidden entries, in path order
fn root_files(directory: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(true);
            let is_root = path.extension().and_then(|e| e.to_str()) == Some("root");
            if !is_root {
                trace!("Skipping non-ROOT file: {}", path.display());
            }
            is_root && !hidden
        })
        .collect();
    files.sort();
    files
}

fn run_batch<S: ByteSource, W: Write>(
    machine: &mut Machine<S, W>,
    commands: &[String],
) -> Result<()> {
    for line in commands {
        if execute(machine, line)? == Step::Quit {
            break;
        }
    }
    Ok(())
}

fn interactive<S: ByteSource, W: Write>(machine: &mut Machine<S, W>, file: &Path) -> Result<()> {
    let mut editor = DefaultEditor::new().context("Failed to initialise the line editor")?;
    println!(
        "rootpeek {}: {} ({} bytes), type 'help' for commands",
        rootpeek_core::VERSION,
        file.display(),
        machine.source().len()
    );

    loop {
        match editor.readline("rootpeek> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    editor.add_history_entry(line.as_str())?;
                }
                if execute(machine, &line)? == Step::Quit {
                    break;
                }
            }
            // Ctrl-C drops the current line only
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read a command"),
        }
    }
    Ok(())
}

/// Run one command line to completion
fn execute<S: ByteSource, W: Write>(machine: &mut Machine<S, W>, line: &str) -> Result<Step> {
    let command = match Command::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(Step::Continue),
        Err(e) => {
            writeln!(machine.output_mut(), "{e}")?;
            return Ok(Step::Continue);
        }
    };
    trace!("Running {:?}", command);

    if command == Command::Help {
        write!(machine.output_mut(), "{}", Command::help())?;
        machine.output_mut().flush()?;
    }

    machine.push_all(command.tasks());
    match machine.run().with_context(|| format!("Command failed: {}", line.trim()))? {
        RunOutcome::Quit => Ok(Step::Quit),
        RunOutcome::Drained => Ok(Step::Continue),
    }
}
