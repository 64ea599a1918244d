pub mod pbs;
pub mod slurm;

use serde::{Deserialize, Serialize};
use speedate::Duration;

use crate::job::Geometry;
use crate::launcher::Launcher;
use crate::walltime;

/// Categories of scheduler flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    /// Environment variables exported to the job.
    Variables,
    /// Block until the job completes.
    Block,
    /// The job name.
    Name,
    /// Process and node counts.
    Processes,
    /// The walltime.
    Walltime,
    /// Memory.
    Memory,
    /// Node-local storage.
    LocalStorage,
    /// The accounting project.
    Account,
    /// The queue.
    Queue,
    /// Flags that depend on the size of the job.
    SizeSpecific,
    /// Fixed flags added to every job.
    Extras,
    /// The stdout file.
    Stdout,
    /// The stderr file.
    Stderr,
}

impl Flag {
    /// All flag categories in the order they are given to the scheduler.
    pub const ORDER: [Flag; 13] = [
        Flag::Variables,
        Flag::Block,
        Flag::Name,
        Flag::Processes,
        Flag::Walltime,
        Flag::Memory,
        Flag::LocalStorage,
        Flag::Account,
        Flag::Queue,
        Flag::SizeSpecific,
        Flag::Extras,
        Flag::Stdout,
        Flag::Stderr,
    ];

    /// Check whether the flag may appear as a directive line in a script.
    ///
    /// Exporting variables and blocking only make sense on the submission
    /// command line.
    pub fn is_directive(self) -> bool {
        !matches!(self, Flag::Variables | Flag::Block)
    }
}

/// A `Scheduler` describes how to request resources from one family of batch
/// schedulers.
pub trait Scheduler: Sync {
    /// The family's name.
    fn name(&self) -> &'static str;

    /// The program that submits a job script.
    fn submit_command(&self) -> &'static str;

    /// The marker that starts a directive line in a job script.
    fn directive_prefix(&self) -> &'static str;

    /// The flag templates for one category.
    ///
    /// Templates name values in braces, e.g. `--ntasks={cores}`. An empty
    /// slice means the scheduler has no flag for the category.
    ///
    fn flags(&self, flag: Flag) -> &'static [&'static str];

    /// Format the walltime the way the scheduler expects it.
    fn format_walltime(&self, walltime: &Duration) -> String {
        walltime::hours_minutes_seconds(walltime)
    }

    /// Flags that depend on the size of the job.
    fn size_specific_flags(&self, _geometry: &Geometry) -> Vec<String> {
        Vec::new()
    }

    /// The launcher used when a system does not configure one.
    fn default_launcher(&self) -> Launcher;
}

/// Types of schedulers.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerType {
    /// Submit jobs with `sbatch`.
    Slurm,
    /// Submit jobs with `qsub` (PBS Pro as configured at NCI).
    Pbs,
}

impl SchedulerType {
    /// Get the scheduler implementation.
    pub fn scheduler(self) -> &'static dyn Scheduler {
        match self {
            SchedulerType::Slurm => &slurm::Slurm,
            SchedulerType::Pbs => &pbs::Pbs,
        }
    }
}
