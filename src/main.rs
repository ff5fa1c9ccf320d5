//! Exploration of method call traces recorded from a managed runtime

#![deny(missing_docs)]

mod display;
mod ui;

use clap::Parser;
use clr_call_trace::{
    CaptureError, CaptureReader, FilterError, FilterOptions, FrameFilter, TraceSession,
    WatchFilter,
};
use log::{debug, warn};
use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    process::ExitCode,
};
use thiserror::Error;

/// Turn a recorded method trace into call listings or call trees
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Maximal number of terminal columns to be used in the display
    #[clap(short = 'c', long = "cols", default_value = "200")]
    max_cols: u16,

    /// Only show calls to methods matching one of these wildcard patterns
    #[clap(short, long)]
    include: Vec<String>,

    /// Hide calls to methods matching one of these wildcard patterns
    #[clap(short, long)]
    exclude: Vec<String>,

    /// Only show calls made by methods matching one of these wildcard patterns
    #[clap(short, long = "parent")]
    parent_method: Vec<String>,

    /// Only show the first call to each method
    #[clap(short, long)]
    unique: bool,

    /// JSON file with more filter options, including parameter value filters
    #[clap(short, long)]
    filter_file: Option<PathBuf>,

    /// Show the call tree of each thread instead of a flat call listing
    #[clap(short, long, conflicts_with = "watch")]
    tree: bool,

    /// Show calls as soon as they return, while the capture is being read
    #[clap(short, long)]
    watch: bool,

    /// Capture file to be analyzed
    input: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Way selected calls are displayed
enum Output {
    /// Flat listing after the capture has been read
    List(FrameFilter),

    /// Per-thread call trees after the capture has been read
    Tree {
        filter: FrameFilter,
        mark_selected: bool,
    },

    /// Flat listing as calls return
    Watch(WatchFilter),
}

/// Read the capture and display it as requested
fn run(args: Args) -> Result<(), CliError> {
    let max_cols = args.max_cols.max(1);

    // Check the filter before reading anything
    let options = filter_options(&args)?;
    debug!("Using filter {options:?}");
    let mark_selected = options != FilterOptions::default();
    let mut output = if args.watch {
        Output::Watch(WatchFilter::new(options)?)
    } else if args.tree {
        Output::Tree {
            filter: FrameFilter::new(options)?,
            mark_selected,
        }
    } else {
        Output::List(FrameFilter::new(options)?)
    };

    // Replay the capture, allowing the user to interrupt it
    let reader = CaptureReader::new(BufReader::new(open(&args.input)?));
    let mut session = TraceSession::default();
    let token = session.cancellation_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("Failed to set up Ctrl-C handler, reading will not be interruptible ({e})");
    }
    let result = match &mut output {
        Output::Watch(filter) => session.watch(reader, filter, |found| {
            ui::stdio::print_match(&found, max_cols)
        }),
        Output::List(_) | Output::Tree { .. } => session.capture(reader),
    };
    let (capture, read_error) = match result {
        Ok(capture) => (capture, None),
        Err(CaptureError::Io { source, partial }) => (*partial, Some(source)),
    };

    // Display what was captured, even if reading failed midway
    match &output {
        Output::List(filter) => ui::stdio::print_matches(filter.filter(&capture.trace), max_cols),
        Output::Tree {
            filter,
            mark_selected,
        } => ui::stdio::print_trees(&capture.trace, filter, *mark_selected, max_cols),
        Output::Watch(_) => {}
    }
    ui::stdio::print_summary(&capture);
    match read_error {
        Some(source) => Err(CliError::Read {
            path: args.input,
            source,
        }),
        None => Ok(()),
    }
}

/// Combine filter options from the command line and the filter file
fn filter_options(args: &Args) -> Result<FilterOptions, CliError> {
    let mut options = match &args.filter_file {
        Some(path) => serde_json::from_reader(BufReader::new(open(path)?)).map_err(|source| {
            CliError::FilterFile {
                path: path.clone(),
                source,
            }
        })?,
        None => FilterOptions::default(),
    };
    options.include.extend(args.include.iter().cloned());
    options.exclude.extend(args.exclude.iter().cloned());
    options
        .parent_method
        .extend(args.parent_method.iter().cloned());
    options.unique |= args.unique;
    Ok(options)
}

/// Open a file for reading
fn open(path: &Path) -> Result<File, CliError> {
    File::open(path).map_err(|source| CliError::Open {
        path: path.to_owned(),
        source,
    })
}

/// What can go wrong while running the command line tool
#[derive(Debug, Error)]
enum CliError {
    /// Failed to open an input file
    #[error("failed to open {} ({source})", .path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Filter file is not valid
    #[error("invalid filter file {} ({source})", .path.display())]
    FilterFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Filter options are not valid
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Capture could not be read to the end
    #[error("failed to read {} to the end ({source})", .path.display())]
    Read { path: PathBuf, source: io::Error },
}
