// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

pub(crate) mod builtin;
pub mod command;
pub mod job;
pub mod launcher;
pub mod scheduler;
pub mod script;
pub mod submit;
pub mod system;
mod template;
pub mod walltime;

use std::io;
use std::path::PathBuf;

/// Name of the environment variable that selects a system by name.
pub const SYSTEM_OVERRIDE_VARIABLE: &str = "HPCRUN_SYSTEM";

/// Name of the environment variable that sets the log level.
pub const LOG_LEVEL_VARIABLE: &str = "HPCRUN_LOG";

/// Errors that may be encountered when using the hpcrun crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // OS errors
    #[error("OS error")]
    OS(#[from] nix::errno::Errno),

    #[error("No home directory")]
    NoHome(),

    // IO errors
    #[error("I/O error: {0}")]
    IO(#[from] io::Error),

    #[error("Unable to read '{0}': {1}")]
    FileRead(PathBuf, #[source] io::Error),

    #[error("Unable to write '{0}': {1}")]
    FileWrite(PathBuf, #[source] io::Error),

    // serialization errors
    #[error("Unable to parse '{0}'.\n{1}")]
    TOMLParse(PathBuf, #[source] toml::de::Error),

    // request errors
    #[error("No command given to run.")]
    NoCommand,

    #[error("The job must launch at least one process.")]
    ZeroProcesses,

    #[error("The number of processes per node on queue '{0}' must be at least one.")]
    ZeroProcessesPerNode(String),

    #[error("Do not know how to convert '{0}' to a walltime.")]
    InvalidWalltime(String),

    #[error(
        "{0} is not present in the environment. The following environment variables must be set when running on {1}:\n{}",
        .2.join("\n")
    )]
    MissingEnvironmentVariable(String, String, Vec<String>),

    #[error("{0} is not a valid queue for system {1}.\nValid queues are:\n{}", .2.join("\n"))]
    UnknownQueue(String, String, Vec<String>),

    // system errors
    #[error("System '{0}' does not match any known HPC system.\nKnown systems are:\n{}", .1.join("\n"))]
    UnknownSystem(String, Vec<String>),

    #[error("Unable to determine the identity of the current system. Set HPCRUN_SYSTEM to one of:\n{}", .0.join("\n"))]
    NoSystemDetected(Vec<String>),

    #[error("The default queue '{1}' of system '{0}' is not one of its queues.")]
    DefaultQueueNotFound(String, String),

    // submission errors
    #[error("Unable to build the job script: {0}")]
    ScriptBuild(String),

    #[error("Unable to run '{0}': {1}.")]
    SubmissionFailure(String, #[source] io::Error),
}
