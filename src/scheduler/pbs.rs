// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use crate::launcher::{Binding, Launcher};
use crate::scheduler::{Flag, Scheduler};

/// The `Pbs` scheduler submits job scripts with `qsub -Wblock=true`.
///
/// The flags follow PBS Pro as deployed at NCI, which bills whole cores,
/// memory and job file system space separately.
pub struct Pbs;

impl Scheduler for Pbs {
    fn name(&self) -> &'static str {
        "pbs"
    }

    fn submit_command(&self) -> &'static str {
        "qsub"
    }

    fn directive_prefix(&self) -> &'static str {
        "#PBS"
    }

    fn flags(&self, flag: Flag) -> &'static [&'static str] {
        match flag {
            Flag::Variables => &["-v {comma_sep_vars}"],
            Flag::Block => &["-Wblock=true"],
            Flag::Name => &["-N {jobname}"],
            Flag::Processes => &["-lncpus={rounded_up_cores}"],
            Flag::Walltime => &["-lwalltime={walltime}"],
            Flag::Memory => &["-lmem={mem}GB"],
            Flag::LocalStorage => &["-ljobfs={local_storage}GB"],
            Flag::Account => &["-P {project}"],
            Flag::Queue => &["-q {queue}"],
            Flag::Extras => &["-lwd"],
            Flag::Stdout => &["-o {outname}"],
            Flag::Stderr => &["-e {errname}"],
            Flag::SizeSpecific => &[],
        }
    }

    fn default_launcher(&self) -> Launcher {
        Launcher {
            executable: "mpiexec".into(),
            binding: Binding::Numa,
        }
    }
}
