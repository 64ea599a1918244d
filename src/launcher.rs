// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::job::Geometry;

/// Launcher
///
/// `Launcher` describes the command that starts the job's processes inside
/// the job script.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Launcher {
    /// The launcher executable, with any fixed arguments.
    pub executable: String,

    /// How processes are placed on cores.
    #[serde(default)]
    pub binding: Binding,
}

/// Process binding strategies.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// The launcher takes placement from the scheduler's allocation.
    #[default]
    Scheduler,
    /// Place an explicit number of ranks on each NUMA zone, bound to cores.
    Numa,
}

impl Launcher {
    /// Build the launch command that prefixes the user's command.
    ///
    /// Single process jobs need no launcher and get an empty string. With
    /// `Binding::Numa`, jobs that fill whole nodes use the bare executable
    /// and all others spread `ceil(processes / nodes / numa_per_node)` ranks
    /// over each NUMA zone, where `nodes = ceil(processes / cores_per_node)`.
    ///
    pub fn prefix(&self, geometry: &Geometry) -> String {
        if geometry.processes <= 1 {
            return String::new();
        }

        match self.binding {
            Binding::Scheduler => self.executable.clone(),
            Binding::Numa => {
                let cores_per_node = geometry.cores_per_node.max(1);
                if geometry.processes % cores_per_node == 0 {
                    return self.executable.clone();
                }

                let nodes = geometry.processes.div_ceil(cores_per_node);
                let ranks_per_numa = geometry
                    .processes
                    .div_ceil(nodes * geometry.numa_per_node.max(1));
                trace!(
                    "Placing {ranks_per_numa} ranks on each NUMA zone of {nodes} node(s)."
                );

                format!(
                    "{} --map-by ppr:{ranks_per_numa}:numa --bind-to core",
                    self.executable
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::parallel;

    fn geometry(processes: usize, cores_per_node: usize, numa_per_node: usize) -> Geometry {
        Geometry {
            processes,
            processes_per_node: cores_per_node,
            cores_per_node,
            numa_per_node,
        }
    }

    fn mpiexec() -> Launcher {
        Launcher {
            executable: "mpiexec".into(),
            binding: Binding::Numa,
        }
    }

    #[test]
    #[parallel]
    fn single_process() {
        let srun = Launcher {
            executable: "srun".into(),
            binding: Binding::Scheduler,
        };
        assert_eq!(srun.prefix(&geometry(1, 128, 8)), "");
        assert_eq!(mpiexec().prefix(&geometry(1, 104, 8)), "");
    }

    #[test]
    #[parallel]
    fn scheduler_binding() {
        let srun = Launcher {
            executable: "srun".into(),
            binding: Binding::Scheduler,
        };
        assert_eq!(srun.prefix(&geometry(2, 128, 8)), "srun");
        assert_eq!(srun.prefix(&geometry(1000, 128, 8)), "srun");
    }

    #[test]
    #[parallel]
    fn whole_nodes() {
        assert_eq!(mpiexec().prefix(&geometry(104, 104, 8)), "mpiexec");
        assert_eq!(mpiexec().prefix(&geometry(208, 104, 8)), "mpiexec");
        assert_eq!(mpiexec().prefix(&geometry(96, 48, 4)), "mpiexec");
    }

    #[test]
    #[parallel]
    fn numa_binding() {
        assert_eq!(
            mpiexec().prefix(&geometry(16, 104, 8)),
            "mpiexec --map-by ppr:2:numa --bind-to core"
        );
        assert_eq!(
            mpiexec().prefix(&geometry(150, 104, 8)),
            "mpiexec --map-by ppr:10:numa --bind-to core"
        );
        assert_eq!(
            mpiexec().prefix(&geometry(5, 48, 4)),
            "mpiexec --map-by ppr:2:numa --bind-to core"
        );
    }

    #[test]
    #[parallel]
    fn ranks_per_numa_formula() {
        for cores_per_node in [4, 48, 104, 128] {
            for numa_per_node in [1, 4, 8] {
                for processes in 2..400 {
                    let prefix =
                        mpiexec().prefix(&geometry(processes, cores_per_node, numa_per_node));
                    if processes % cores_per_node == 0 {
                        assert_eq!(prefix, "mpiexec");
                    } else {
                        let nodes = processes.div_ceil(cores_per_node);
                        #[allow(clippy::cast_precision_loss)]
                        let expected =
                            (processes as f64 / nodes as f64 / numa_per_node as f64).ceil();
                        assert!(prefix.contains(&format!("ppr:{expected}:numa")), "{prefix}");
                    }
                }
            }
        }
    }
}
