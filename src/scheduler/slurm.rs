// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use crate::job::Geometry;
use crate::launcher::{Binding, Launcher};
use crate::scheduler::{Flag, Scheduler};

/// The `Slurm` scheduler submits job scripts with `sbatch --wait`.
pub struct Slurm;

impl Scheduler for Slurm {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn submit_command(&self) -> &'static str {
        "sbatch"
    }

    fn directive_prefix(&self) -> &'static str {
        "#SBATCH"
    }

    fn flags(&self, flag: Flag) -> &'static [&'static str] {
        match flag {
            Flag::Variables => &["--export {comma_sep_vars}"],
            Flag::Block => &["--wait"],
            Flag::Name => &["-J {jobname}"],
            Flag::Processes => &["--ntasks={cores}", "--nodes={nodes}"],
            Flag::Walltime => &["-t {walltime}"],
            Flag::Account => &["-A {project}"],
            Flag::Queue => &["-p {queue}"],
            Flag::Stdout => &["-o {outname}"],
            Flag::Stderr => &["-e {errname}"],
            Flag::Memory | Flag::LocalStorage | Flag::SizeSpecific | Flag::Extras => &[],
        }
    }

    /// Request exclusive nodes once the job uses more than half a node.
    fn size_specific_flags(&self, geometry: &Geometry) -> Vec<String> {
        if 2 * geometry.processes > geometry.cores_per_node {
            vec!["--exclusive".into()]
        } else {
            Vec::new()
        }
    }

    fn default_launcher(&self) -> Launcher {
        Launcher {
            executable: "srun".into(),
            binding: Binding::Scheduler,
        }
    }
}
