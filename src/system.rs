// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use log::{info, trace};
use serde::{Deserialize, Serialize};
use speedate::Duration;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::builtin::BuiltIn;
use crate::launcher::Launcher;
use crate::scheduler::{Scheduler, SchedulerType};
use crate::{walltime, Error, SYSTEM_OVERRIDE_VARIABLE};

/// The job template used when a system does not define its own.
pub const DEFAULT_TEMPLATE: &str = "{header}

{directives}

{prescript}

{executor} {command}
";

/// System configuration
///
/// `Configuration` stores every known system: the built-in ones and any
/// defined by the user.
///
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// The system definitions.
    #[serde(default)]
    pub(crate) system: Vec<System>,
}

/// System
///
/// `System` stores everything needed to request resources on a single HPC
/// system. It is read from the `systems.toml` file.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct System {
    /// The system's name.
    pub name: String,

    /// The method used to automatically identify this system.
    pub identify: IdentificationMethod,

    /// The scheduler used on the system.
    pub scheduler: SchedulerType,

    /// The process launcher. Defaults to the scheduler's launcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher: Option<Launcher>,

    /// The queue used when the job does not name one.
    pub default_queue: String,

    /// The environment variable that holds the accounting project.
    #[serde(default = "default_project_variable")]
    pub project_variable: String,

    /// Environment variables that must be set to run a job.
    #[serde(default)]
    pub required_environment: BTreeSet<String>,

    /// The script header, usually the interpreter line.
    #[serde(default)]
    pub header: String,

    /// Commands that prepare the environment before the job runs.
    #[serde(default)]
    pub prescript: String,

    /// The job script template.
    #[serde(default = "default_template")]
    pub template: String,

    /// The default walltime.
    #[serde(
        default,
        with = "walltime::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub walltime: Option<Duration>,

    /// Additional scheduler flag templates added to every job.
    #[serde(default)]
    pub submit_options: Vec<String>,

    /// The queues on the system.
    pub queue: BTreeMap<String, Queue>,
}

/// Methods to identify systems.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationMethod {
    /// Identify a system when an environment variable is equal to a value.
    ByEnvironment(String, String),
    /// Identify a system when the hostname starts with the given prefix.
    ByHostnamePrefix(String),
    /// Identify a system always (true) or never (false)
    Always(bool),
}

/// Queue parameters.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Queue {
    /// Physical cores on each node.
    pub cores_per_node: usize,

    /// NUMA zones on each node.
    pub numa_per_node: usize,

    /// Node-local disk in GB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_disk_per_node: Option<u64>,

    /// Processes to place on each node when the job does not say.
    pub default_processes_per_node: usize,

    /// Memory on each node in GB.
    pub memory_per_node: f64,

    /// Maximum number of cores one job may request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_cores_per_job: Option<usize>,
}

fn default_project_variable() -> String {
    "PROJECT".into()
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.into()
}

impl Configuration {
    /// Identify the system.
    ///
    /// Identifying the current system consumes the `Configuration`.
    ///
    /// # Errors
    /// * `hpcrun::Error::UnknownSystem` when a system by the given name
    ///   is not present in the configuration (when `name = Some(_)`).
    /// * `hpcrun::Error::NoSystemDetected` when the automatic identification
    ///   fails to find a system in the configuration.
    ///
    pub fn identify(self, name: Option<&str>) -> Result<System, Error> {
        let names = self.names();

        let system = if let Some(name) = name {
            self.system
                .into_iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Error::UnknownSystem(name.to_string(), names))?
        } else {
            self.system
                .into_iter()
                .find(System::identity_matches)
                .ok_or_else(|| Error::NoSystemDetected(names))?
        };

        info!("Detected system: {}", system.name);
        Ok(system)
    }

    /// Names of all systems, without duplicates, in search order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.system.len());
        for system in &self.system {
            if !names.contains(&system.name) {
                names.push(system.name.clone());
            }
        }
        names
    }

    /// Open the system configuration
    ///
    /// Open `$HOME/.config/hpcrun/systems.toml` if it exists and merge it with
    /// the built-in configuration. Set `HPCRUN_HOME` to use a directory
    /// other than `$HOME`.
    ///
    /// # Errors
    /// Returns `Err(hpcrun::Error)` when the file cannot be read, if there is
    /// a parse error, or if a system's default queue is not one of its queues.
    ///
    pub fn open() -> Result<Self, Error> {
        let home = match env::var("HPCRUN_HOME") {
            Ok(hpcrun_home) => PathBuf::from(hpcrun_home),
            Err(_) => home::home_dir().ok_or_else(Error::NoHome)?,
        };
        let systems_toml_path = home.join(".config").join("hpcrun").join("systems.toml");
        Self::open_from_path(systems_toml_path)
    }

    fn open_from_path(systems_toml_path: PathBuf) -> Result<Self, Error> {
        let mut systems = Self::built_in();

        let systems_file = match File::open(&systems_toml_path) {
            Ok(file) => file,
            Err(error) => match error.kind() {
                io::ErrorKind::NotFound => {
                    trace!(
                        "'{}' does not exist, using built-in systems.",
                        &systems_toml_path.display()
                    );
                    return Ok(systems);
                }
                _ => return Err(Error::FileRead(systems_toml_path, error)),
            },
        };

        let mut buffer = BufReader::new(systems_file);
        let mut systems_string = String::new();
        buffer
            .read_to_string(&mut systems_string)
            .map_err(|e| Error::FileRead(systems_toml_path.clone(), e))?;

        trace!("Parsing '{}'.", &systems_toml_path.display());
        let user_config = Self::parse_str(&systems_toml_path, &systems_string)?;
        systems.merge(user_config);
        systems.validate()?;
        Ok(systems)
    }

    /// Parse a `Configuration` from a TOML string
    ///
    /// Does *NOT* merge with the built-in configuration.
    ///
    pub(crate) fn parse_str(path: &Path, toml: &str) -> Result<Self, Error> {
        let systems: Configuration =
            toml::from_str(toml).map_err(|e| Error::TOMLParse(path.into(), e))?;
        Ok(systems)
    }

    /// Merge systems from another configuration into this one.
    ///
    /// Systems in `b` are searched first, so a system in `b` replaces a
    /// system of the same name in self.
    ///
    fn merge(&mut self, b: Self) {
        let mut new_system = b.system;
        new_system.append(&mut self.system);
        self.system = new_system;
    }

    /// Validate that every system's default queue is one of its queues.
    fn validate(&self) -> Result<(), Error> {
        for system in &self.system {
            if !system.queue.contains_key(&system.default_queue) {
                return Err(Error::DefaultQueueNotFound(
                    system.name.clone(),
                    system.default_queue.clone(),
                ));
            }
        }

        Ok(())
    }
}

impl System {
    /// Detect the system this process is running on.
    ///
    /// Honors `HPCRUN_SYSTEM` when it is set, otherwise checks each known
    /// system's identification method in turn.
    ///
    /// # Errors
    /// Returns `Err(hpcrun::Error)` when the configuration cannot be opened or
    /// no system is found.
    ///
    pub fn detect() -> Result<Self, Error> {
        let name = env::var(SYSTEM_OVERRIDE_VARIABLE).ok();
        Configuration::open()?.identify(name.as_deref())
    }

    /// Check if the system's identity matches the current environment.
    fn identity_matches(&self) -> bool {
        trace!("Checking system '{}' via '{:?}'.", self.name, self.identify);
        match &self.identify {
            IdentificationMethod::Always(condition) => *condition,
            IdentificationMethod::ByEnvironment(variable, value) => {
                env::var(variable).is_ok_and(|x| x == *value)
            }
            IdentificationMethod::ByHostnamePrefix(prefix) => nix::unistd::gethostname()
                .ok()
                .and_then(|hostname| hostname.into_string().ok())
                .is_some_and(|hostname| hostname.starts_with(prefix.as_str())),
        }
    }

    /// Find the named queue, or the default queue when `name` is `None`.
    ///
    /// # Errors
    /// `Err(hpcrun::Error::UnknownQueue)` when the system has no such queue.
    ///
    pub fn find_queue(&self, name: Option<&str>) -> Result<(&str, &Queue), Error> {
        let name = name.unwrap_or(&self.default_queue);
        self.queue
            .get_key_value(name)
            .map(|(name, queue)| (name.as_str(), queue))
            .ok_or_else(|| {
                Error::UnknownQueue(
                    name.to_string(),
                    self.name.clone(),
                    self.queue.keys().cloned().collect(),
                )
            })
    }

    /// The environment variables that must be set to submit a job.
    ///
    /// Includes the project variable.
    pub fn required_environment(&self) -> BTreeSet<&str> {
        let mut result: BTreeSet<&str> = self
            .required_environment
            .iter()
            .map(String::as_str)
            .collect();
        result.insert(&self.project_variable);
        result
    }

    /// The scheduler implementation for this system.
    pub fn scheduler(&self) -> &'static dyn Scheduler {
        self.scheduler.scheduler()
    }

    /// The process launcher for this system.
    pub fn launcher(&self) -> Launcher {
        self.launcher
            .clone()
            .unwrap_or_else(|| self.scheduler().default_launcher())
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use serial_test::{parallel, serial};

    use super::*;
    use crate::launcher::Binding;

    fn setup() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::max())
            .is_test(true)
            .try_init();
    }

    fn system(name: &str, identify: IdentificationMethod) -> System {
        let mut queue = BTreeMap::new();
        queue.insert(
            "work".into(),
            Queue {
                cores_per_node: 128,
                numa_per_node: 8,
                local_disk_per_node: None,
                default_processes_per_node: 8,
                memory_per_node: 230.0,
                maximum_cores_per_job: None,
            },
        );
        queue.insert(
            "long".into(),
            Queue {
                cores_per_node: 128,
                numa_per_node: 8,
                local_disk_per_node: None,
                default_processes_per_node: 128,
                memory_per_node: 230.0,
                maximum_cores_per_job: Some(1024),
            },
        );

        System {
            name: name.into(),
            identify,
            scheduler: SchedulerType::Slurm,
            launcher: None,
            default_queue: "work".into(),
            project_variable: "PROJECT".into(),
            required_environment: BTreeSet::new(),
            header: String::new(),
            prescript: String::new(),
            template: DEFAULT_TEMPLATE.into(),
            walltime: None,
            submit_options: Vec::new(),
            queue,
        }
    }

    #[test]
    #[serial]
    fn identify() {
        setup();
        let systems = vec![
            system("system0", IdentificationMethod::Always(false)),
            system(
                "system1",
                IdentificationMethod::ByEnvironment("_hpcrun_select".into(), "a".into()),
            ),
            system(
                "system2",
                IdentificationMethod::ByEnvironment("_hpcrun_select".into(), "b".into()),
            ),
            system("system3", IdentificationMethod::Always(true)),
            system(
                "system4",
                IdentificationMethod::ByEnvironment("_hpcrun_Select".into(), "b".into()),
            ),
        ];
        let configuration = Configuration { system: systems };
        assert_eq!(
            configuration.clone().identify(Some("system4")).unwrap(),
            configuration.system[4]
        );

        let error = configuration.clone().identify(Some("not a system"));
        match error {
            Err(Error::UnknownSystem(name, known)) => {
                assert_eq!(name, "not a system");
                assert_eq!(known.len(), 5);
            }
            _ => panic!("expected UnknownSystem"),
        }

        env::remove_var("_hpcrun_select");
        assert_eq!(
            configuration.clone().identify(None).unwrap(),
            configuration.system[3]
        );

        env::set_var("_hpcrun_select", "b");
        assert_eq!(
            configuration.clone().identify(None).unwrap(),
            configuration.system[2]
        );

        env::set_var("_hpcrun_select", "a");
        assert_eq!(
            configuration.clone().identify(None).unwrap(),
            configuration.system[1]
        );

        assert_eq!(
            configuration.clone().identify(Some("system0")).unwrap(),
            configuration.system[0]
        );
        env::remove_var("_hpcrun_select");
    }

    #[test]
    #[parallel]
    fn nothing_detected() {
        setup();
        let configuration = Configuration {
            system: vec![
                system("a", IdentificationMethod::Always(false)),
                system(
                    "b",
                    IdentificationMethod::ByHostnamePrefix("\u{1}no host has this name".into()),
                ),
            ],
        };

        match configuration.identify(None) {
            Err(Error::NoSystemDetected(known)) => assert_eq!(known, vec!["a", "b"]),
            _ => panic!("expected NoSystemDetected"),
        }
    }

    #[test]
    #[parallel]
    fn hostname() {
        setup();
        let hostname = nix::unistd::gethostname()
            .unwrap()
            .into_string()
            .unwrap();
        let prefix: String = hostname.chars().take(2).collect();
        let configuration = Configuration {
            system: vec![system(
                "host",
                IdentificationMethod::ByHostnamePrefix(prefix),
            )],
        };
        assert_eq!(configuration.identify(None).unwrap().name, "host");
    }

    #[test]
    #[parallel]
    fn find_queue() {
        setup();
        let system = system("s", IdentificationMethod::Always(true));

        let (name, queue) = system.find_queue(None).unwrap();
        assert_eq!(name, "work");
        assert_eq!(queue.default_processes_per_node, 8);

        let (name, queue) = system.find_queue(Some("long")).unwrap();
        assert_eq!(name, "long");
        assert_eq!(queue.maximum_cores_per_job, Some(1024));

        let error = system.find_queue(Some("debug"));
        match error {
            Err(Error::UnknownQueue(queue, system, valid)) => {
                assert_eq!(queue, "debug");
                assert_eq!(system, "s");
                assert_eq!(valid, vec!["long", "work"]);
            }
            _ => panic!("expected UnknownQueue"),
        }
    }

    #[test]
    #[parallel]
    fn required_environment() {
        let mut system = system("s", IdentificationMethod::Always(true));
        system.required_environment.insert("MY_GADOPT".into());
        system.project_variable = "PAWSEY_PROJECT".into();

        let required: Vec<&str> = system.required_environment().into_iter().collect();
        assert_eq!(required, vec!["MY_GADOPT", "PAWSEY_PROJECT"]);
    }

    #[test]
    #[parallel]
    fn launcher_default() {
        let mut system = system("s", IdentificationMethod::Always(true));
        assert_eq!(system.launcher().executable, "srun");

        system.launcher = Some(Launcher {
            executable: "mpirun".into(),
            binding: Binding::Numa,
        });
        assert_eq!(system.launcher().executable, "mpirun");
    }

    #[test]
    #[parallel]
    fn open_no_file() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        let systems = Configuration::open_from_path(temp.path().into()).expect("valid systems");
        assert_eq!(systems, Configuration::built_in());
    }

    #[test]
    #[parallel]
    fn open_empty_file() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str("").unwrap();
        let systems = Configuration::open_from_path(temp.path().into()).expect("valid systems");
        assert_eq!(systems, Configuration::built_in());
    }

    #[test]
    #[parallel]
    fn minimal_system() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str(
            r#"
[[system]]
name = "a"
identify.always = true
scheduler = "slurm"
default_queue = "b"

[system.queue.b]
cores_per_node = 4
numa_per_node = 1
default_processes_per_node = 4
memory_per_node = 16.0
"#,
        )
        .unwrap();
        let systems = Configuration::open_from_path(temp.path().into()).unwrap();
        let built_in_systems = Configuration::built_in();
        assert_eq!(systems.system.len(), 1 + built_in_systems.system.len());

        let system = systems.system.first().unwrap();
        assert_eq!(system.name, "a");
        assert_eq!(system.identify, IdentificationMethod::Always(true));
        assert_eq!(system.scheduler, SchedulerType::Slurm);
        assert_eq!(system.launcher, None);
        assert_eq!(system.project_variable, "PROJECT");
        assert!(system.required_environment.is_empty());
        assert_eq!(system.template, DEFAULT_TEMPLATE);
        assert_eq!(system.walltime, None);
        assert_eq!(
            system.queue["b"],
            Queue {
                cores_per_node: 4,
                numa_per_node: 1,
                local_disk_per_node: None,
                default_processes_per_node: 4,
                memory_per_node: 16.0,
                maximum_cores_per_job: None,
            }
        );
    }

    #[test]
    #[parallel]
    fn maximal_system() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str(
            r##"
[[system]]
name = "a"
identify.by_environment = ["b", "c"]
scheduler = "pbs"
launcher = { executable = "mpirun", binding = "scheduler" }
default_queue = "d"
project_variable = "ACCOUNT"
required_environment = ["E", "F"]
header = "#!/bin/sh"
prescript = "module load g"
template = "{header} {command}"
walltime = "1:00:00"
submit_options = ["-lstorage=gdata/{project}"]

[system.queue.d]
cores_per_node = 48
numa_per_node = 4
local_disk_per_node = 400
default_processes_per_node = 24
memory_per_node = 190.0
maximum_cores_per_job = 96
"##,
        )
        .unwrap();
        let systems = Configuration::open_from_path(temp.path().into()).unwrap();

        let system = systems.system.first().unwrap();
        assert_eq!(system.name, "a");
        assert_eq!(
            system.identify,
            IdentificationMethod::ByEnvironment("b".into(), "c".into())
        );
        assert_eq!(system.scheduler, SchedulerType::Pbs);
        assert_eq!(
            system.launcher,
            Some(Launcher {
                executable: "mpirun".into(),
                binding: Binding::Scheduler,
            })
        );
        assert_eq!(system.project_variable, "ACCOUNT");
        assert_eq!(
            system.required_environment,
            BTreeSet::from(["E".to_string(), "F".to_string()])
        );
        assert_eq!(system.header, "#!/bin/sh");
        assert_eq!(system.prescript, "module load g");
        assert_eq!(system.template, "{header} {command}");
        assert_eq!(
            system.walltime.as_ref().map(Duration::signed_total_seconds),
            Some(3600)
        );
        assert_eq!(system.submit_options, vec!["-lstorage=gdata/{project}"]);
        assert_eq!(
            system.queue["d"],
            Queue {
                cores_per_node: 48,
                numa_per_node: 4,
                local_disk_per_node: Some(400),
                default_processes_per_node: 24,
                memory_per_node: 190.0,
                maximum_cores_per_job: Some(96),
            }
        );
    }

    #[test]
    #[parallel]
    fn user_system_replaces_built_in() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str(
            r#"
[[system]]
name = "gadi"
identify.always = false
scheduler = "pbs"
default_queue = "normal"

[system.queue.normal]
cores_per_node = 48
numa_per_node = 4
default_processes_per_node = 48
memory_per_node = 190.0
"#,
        )
        .unwrap();
        let systems = Configuration::open_from_path(temp.path().into()).unwrap();
        let names = systems.names();
        assert_eq!(names.iter().filter(|n| *n == "gadi").count(), 1);

        let gadi = systems.identify(Some("gadi")).unwrap();
        assert_eq!(gadi.queue.len(), 1);
    }

    #[test]
    #[parallel]
    fn default_queue_must_exist() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str(
            r#"
[[system]]
name = "a"
identify.always = true
scheduler = "slurm"
default_queue = "missing"

[system.queue.b]
cores_per_node = 4
numa_per_node = 1
default_processes_per_node = 4
memory_per_node = 16.0
"#,
        )
        .unwrap();
        let result = Configuration::open_from_path(temp.path().into());
        assert!(matches!(result, Err(Error::DefaultQueueNotFound(_, _))));
    }

    #[test]
    #[parallel]
    fn invalid_toml() {
        setup();
        let temp = TempDir::new().unwrap().child("systems.toml");
        temp.write_str("[[system]]\nname = 1\n").unwrap();
        let result = Configuration::open_from_path(temp.path().into());
        assert!(matches!(result, Err(Error::TOMLParse(_, _))));
    }

    #[test]
    #[parallel]
    fn built_in_round_trip() {
        let built_in = Configuration::built_in();
        let text = toml::to_string_pretty(&built_in).expect("valid TOML");
        let parsed = Configuration::parse_str(Path::new("systems.toml"), &text).unwrap();
        assert_eq!(parsed, built_in);
    }
}
