// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use log::{debug, warn};
use speedate::Duration;
use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::scheduler::{Flag, Scheduler};
use crate::system::{Queue, System};
use crate::template::Values;
use crate::walltime::default_walltime;
use crate::Error;

/// Extra environment variables to pass to the job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraEnvironment {
    /// Comma separated `KEY=VALUE` pairs.
    Text(String),
    /// Variable names mapped to values.
    Map(BTreeMap<String, String>),
}

impl ExtraEnvironment {
    /// Render as comma separated `KEY=VALUE` pairs, or `None` when empty.
    fn render(&self) -> Option<String> {
        match self {
            ExtraEnvironment::Text(text) if text.is_empty() => None,
            ExtraEnvironment::Text(text) => Some(text.clone()),
            ExtraEnvironment::Map(map) if map.is_empty() => None,
            ExtraEnvironment::Map(map) => {
                let mut result = String::new();
                for (key, value) in map {
                    if !result.is_empty() {
                        result.push(',');
                    }
                    let _ = write!(result, "{key}={value}");
                }
                Some(result)
            }
        }
    }
}

impl From<&str> for ExtraEnvironment {
    fn from(text: &str) -> Self {
        ExtraEnvironment::Text(text.into())
    }
}

impl From<BTreeMap<String, String>> for ExtraEnvironment {
    fn from(map: BTreeMap<String, String>) -> Self {
        ExtraEnvironment::Map(map)
    }
}

/// Job request
///
/// `JobRequest` holds what the caller asks for: the process count, the
/// command and any overrides of the system defaults. Unset (`None`) and
/// empty string overrides use the system default.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobRequest {
    /// Total number of processes to launch.
    pub processes: usize,

    /// The command to run, one argument per element.
    pub command: Vec<String>,

    /// Environment variables to pass in addition to the required ones.
    pub environment: Option<ExtraEnvironment>,

    /// Processes to place on each node.
    pub processes_per_node: Option<usize>,

    /// The walltime.
    pub walltime: Option<Duration>,

    /// Memory in GB.
    pub memory: Option<u64>,

    /// The job's stdout file.
    pub output: Option<String>,

    /// The job's stderr file.
    pub error: Option<String>,

    /// The job name.
    pub job_name: Option<String>,

    /// The queue.
    pub queue: Option<String>,

    /// The job script template.
    pub template: Option<String>,

    /// The script header.
    pub header: Option<String>,

    /// Commands to run before the job.
    pub prescript: Option<String>,

    /// Keep the job script at this path instead of a temporary file.
    pub save_script: Option<PathBuf>,
}

/// The shape of a job on the nodes of its queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Total number of processes.
    pub processes: usize,
    /// Processes placed on each node.
    pub processes_per_node: usize,
    /// Physical cores on each node.
    pub cores_per_node: usize,
    /// NUMA zones on each node.
    pub numa_per_node: usize,
}

/// Job specification
///
/// `JobSpec` is a `JobRequest` with every default resolved against a
/// `System`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    pub processes: usize,
    pub processes_per_node: usize,
    pub nodes: usize,
    /// `processes` rounded up to whole nodes, for schedulers that bill by
    /// the node.
    pub rounded_up_cores: usize,
    pub cores_per_node: usize,
    pub numa_per_node: usize,
    pub local_disk_per_node: Option<u64>,
    /// Memory in GB.
    pub memory: u64,
    pub walltime: Duration,
    /// Comma separated `KEY=VALUE` pairs.
    pub environment: String,
    pub queue: String,
    pub project: String,
    pub job_name: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub template: String,
    pub header: String,
    pub prescript: String,
    pub command: Vec<String>,
}

impl JobRequest {
    /// Construct a request for `processes` processes running `command`.
    pub fn new(processes: usize, command: Vec<String>) -> Self {
        JobRequest {
            processes,
            command,
            ..JobRequest::default()
        }
    }

    /// Resolve the request against a system.
    ///
    /// Required environment variables are read from the process environment.
    ///
    /// # Errors
    /// * `hpcrun::Error::NoCommand` when the command is empty. This is checked
    ///   first.
    /// * `hpcrun::Error::ZeroProcesses` when `processes` is 0.
    /// * `hpcrun::Error::MissingEnvironmentVariable` when a required
    ///   variable is not set.
    /// * `hpcrun::Error::UnknownQueue` when the system has no such queue.
    /// * `hpcrun::Error::ZeroProcessesPerNode` when there would be no
    ///   processes on each node.
    ///
    pub fn resolve(&self, system: &System) -> Result<JobSpec, Error> {
        self.resolve_with(system, |name| env::var(name).ok())
    }

    /// Resolve the request, looking up environment variables with `lookup`.
    pub(crate) fn resolve_with<F>(&self, system: &System, lookup: F) -> Result<JobSpec, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.command.is_empty() {
            return Err(Error::NoCommand);
        }
        if self.processes == 0 {
            return Err(Error::ZeroProcesses);
        }

        let required = system.required_environment();
        let mut variables = Vec::with_capacity(required.len() + 1);
        let mut project = String::new();
        for name in &required {
            let value = lookup(name).ok_or_else(|| {
                Error::MissingEnvironmentVariable(
                    (*name).to_string(),
                    system.name.clone(),
                    required.iter().map(ToString::to_string).collect(),
                )
            })?;
            if *name == system.project_variable {
                project.clone_from(&value);
            }
            variables.push(format!("{name}={value}"));
        }
        if let Some(extra) = self.environment.as_ref().and_then(ExtraEnvironment::render) {
            variables.push(extra);
        }

        let (queue_name, queue) = system.find_queue(non_empty(self.queue.as_ref()))?;

        let processes_per_node = self
            .processes_per_node
            .unwrap_or(queue.default_processes_per_node);
        if processes_per_node == 0 {
            return Err(Error::ZeroProcessesPerNode(queue_name.into()));
        }
        let nodes = self.processes.div_ceil(processes_per_node);

        let memory = if let Some(memory) = self.memory {
            if memory == 0 {
                warn!("Requesting 0 GB of memory as asked.");
            }
            memory
        } else {
            default_memory(self.processes, nodes, queue)
        };

        if let Some(maximum) = queue.maximum_cores_per_job {
            if self.processes > maximum {
                warn!(
                    "{} processes exceeds the {maximum} core limit of queue '{queue_name}'.",
                    self.processes
                );
            }
        }

        let walltime = self
            .walltime
            .clone()
            .or_else(|| system.walltime.clone())
            .unwrap_or_else(default_walltime);

        let spec = JobSpec {
            processes: self.processes,
            processes_per_node,
            nodes,
            rounded_up_cores: rounded_up_cores(self.processes, processes_per_node),
            cores_per_node: queue.cores_per_node,
            numa_per_node: queue.numa_per_node,
            local_disk_per_node: queue.local_disk_per_node,
            memory,
            walltime,
            environment: variables.join(","),
            queue: queue_name.into(),
            project,
            job_name: non_empty(self.job_name.as_ref()).map(Into::into),
            output: non_empty(self.output.as_ref()).map(Into::into),
            error: non_empty(self.error.as_ref()).map(Into::into),
            template: non_empty(self.template.as_ref())
                .unwrap_or(&system.template)
                .into(),
            header: non_empty(self.header.as_ref())
                .unwrap_or(&system.header)
                .into(),
            prescript: non_empty(self.prescript.as_ref())
                .unwrap_or(&system.prescript)
                .into(),
            command: self.command.clone(),
        };

        debug!(
            "Resolved {} processes on {} node(s) of queue '{}' with {} GB.",
            spec.processes, spec.nodes, spec.queue, spec.memory
        );
        Ok(spec)
    }
}

impl JobSpec {
    /// The job's geometry.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            processes: self.processes,
            processes_per_node: self.processes_per_node,
            cores_per_node: self.cores_per_node,
            numa_per_node: self.numa_per_node,
        }
    }

    /// Check whether the job asks for flags of the given category.
    ///
    /// The name, stdout and stderr flags are only given when the caller
    /// chose a value.
    pub fn requests(&self, flag: Flag) -> bool {
        match flag {
            Flag::Name => self.job_name.is_some(),
            Flag::Stdout => self.output.is_some(),
            Flag::Stderr => self.error.is_some(),
            _ => true,
        }
    }

    /// The values available to scheduler flag templates.
    pub(crate) fn format_values(&self, scheduler: &dyn Scheduler) -> Values<'static> {
        let mut values = Values::new();
        values.insert("jobname", self.job_name.clone().unwrap_or_default());
        values.insert("comma_sep_vars", self.environment.clone());
        values.insert("cores", self.processes.to_string());
        values.insert("rounded_up_cores", self.rounded_up_cores.to_string());
        values.insert("ppn", self.processes_per_node.to_string());
        values.insert("nodes", self.nodes.to_string());
        values.insert("walltime", scheduler.format_walltime(&self.walltime));
        values.insert("mem", self.memory.to_string());
        if let Some(local_disk_per_node) = self.local_disk_per_node {
            values.insert("local_storage", local_disk_per_node.to_string());
        }
        values.insert("queue", self.queue.clone());
        values.insert("project", self.project.clone());
        values.insert("outname", self.output.clone().unwrap_or_default());
        values.insert("errname", self.error.clone().unwrap_or_default());
        values
    }
}

/// Treat empty strings as unset.
fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

/// Round `processes` up to a whole number of nodes.
///
/// Jobs smaller than one node are not rounded.
pub fn rounded_up_cores(processes: usize, processes_per_node: usize) -> usize {
    if processes < processes_per_node {
        processes
    } else {
        processes.div_ceil(processes_per_node) * processes_per_node
    }
}

/// Memory (in GB) to request when the caller does not choose.
///
/// A job on one node gets memory in proportion to the cores it uses. Larger
/// jobs get all the memory on every node.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn default_memory(processes: usize, nodes: usize, queue: &Queue) -> u64 {
    let memory = if nodes == 1 {
        processes as f64 / queue.cores_per_node.max(1) as f64 * queue.memory_per_node
    } else {
        nodes as f64 * queue.memory_per_node
    };
    memory.floor() as u64
}
