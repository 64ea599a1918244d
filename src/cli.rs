// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

pub mod run;
pub mod system;

use clap::{Parser, ValueEnum};
use log::{trace, LevelFilter};
use speedate::Duration;
use std::fs;
use std::path::{Path, PathBuf};

use hpcrun::{walltime, Error};

/// Run a command as a batch job on the detected HPC system.
///
/// hpcrun builds the scheduler submission command and a job script for the
/// current system, submits the job and waits for it to finish. It exits with
/// the exit status of the submission command.
///
/// EXAMPLES
///
/// * Run a 4 process job:
///
///   hpcrun -n 4 python3 job.py
///
/// * Run on a specific queue with a one hour walltime:
///
///   hpcrun -n 208 -q expresssr -t 1:00:00 python3 job.py --resolution 64
///
/// * Print the job script without submitting it:
///
///   hpcrun --dry-run -n 16 python3 job.py
///
#[derive(Parser, Debug)]
#[command(version, verbatim_doc_comment)]
pub struct Options {
    /// Number of processes to launch.
    #[arg(short = 'n', long = "np", required_unless_present = "show_system", display_order = 0)]
    pub processes: Option<usize>,

    /// Additional environment to pass to the job (comma separated KEY=VALUE).
    #[arg(short = 'v', long = "env", display_order = 0)]
    pub environment: Option<String>,

    /// Number of processes per node.
    #[arg(long = "ppn", display_order = 0)]
    pub processes_per_node: Option<usize>,

    /// Path to the job's stdout file.
    #[arg(short = 'o', long = "outfile", display_order = 0)]
    pub output: Option<String>,

    /// Path to the job's stderr file.
    #[arg(short = 'e', long = "errfile", display_order = 0)]
    pub error: Option<String>,

    /// Name of the batch job.
    #[arg(short = 'N', long = "jobname", display_order = 0)]
    pub job_name: Option<String>,

    /// Queue to submit the job to.
    #[arg(short = 'q', long, display_order = 0)]
    pub queue: Option<String>,

    /// Walltime in seconds or [[DD:]HH:]MM:SS format.
    #[arg(short = 't', long, value_parser = walltime::parse, display_order = 0)]
    pub walltime: Option<Duration>,

    /// Memory in GB.
    #[arg(long = "mem", display_order = 0)]
    pub memory: Option<u64>,

    /// Path to a file containing the job script template.
    #[arg(long, display_order = 1)]
    pub template_file: Option<PathBuf>,

    /// Path to a file containing the job script header.
    #[arg(long, display_order = 1)]
    pub header_file: Option<PathBuf>,

    /// Path to a file containing commands to run before the job.
    #[arg(long, display_order = 1)]
    pub prescript_file: Option<PathBuf>,

    /// Keep the job script at this path.
    #[arg(long, display_order = 1)]
    pub save_script: Option<PathBuf>,

    /// Print the job script and submission command without submitting.
    #[arg(long, display_order = 1)]
    pub dry_run: bool,

    /// Submit to the named system.
    ///
    /// Autodetected by default.
    #[arg(long, env = "HPCRUN_SYSTEM", display_order = 2)]
    pub system: Option<String>,

    /// Show the system configuration and exit.
    #[arg(long, display_order = 2)]
    pub show_system: bool,

    /// When to print colored output.
    #[arg(long, value_name="WHEN", value_enum, default_value_t=ColorMode::Auto, env="HPCRUN_COLOR", display_order=2)]
    pub color: ColorMode,

    /// The command to run.
    #[arg(trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect when to print colored output.
    Auto,

    /// Always print colored output.
    Always,

    /// Never print colored output.
    Never,
}

/// Interpret a log level.
///
/// Accepts a level name (`off`, `critical`, `error`, `warn`, `warning`,
/// `info`, `debug`, or `trace`, in any case) or a number on the 0-50
/// severity scale where 50 is the most severe.
///
/// # Returns
/// `None` when `value` is not a known level.
///
pub fn log_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "critical" | "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        number => number.parse::<i64>().ok().map(|level| match level {
            40.. => LevelFilter::Error,
            30..=39 => LevelFilter::Warn,
            20..=29 => LevelFilter::Info,
            10..=19 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }),
    }
}

/// Read an optional text file given on the command line.
///
/// An empty path is treated as not given.
///
/// # Errors
/// `Err(hpcrun::Error::FileRead)` when the file cannot be read.
///
pub fn read_optional_file(path: Option<&Path>) -> Result<Option<String>, Error> {
    match path {
        Some(path) if !path.as_os_str().is_empty() => {
            trace!("Reading '{}'.", path.display());
            let contents =
                fs::read_to_string(path).map_err(|e| Error::FileRead(path.into(), e))?;
            Ok(Some(contents))
        }
        _ => Ok(None),
    }
}
