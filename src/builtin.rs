use std::collections::{BTreeMap, BTreeSet};

use crate::scheduler::SchedulerType;
use crate::system::{self, IdentificationMethod, Queue, System, DEFAULT_TEMPLATE};

pub(crate) trait BuiltIn {
    fn built_in() -> Self;
}

/// Construct a queue.
fn queue(
    cores_per_node: usize,
    numa_per_node: usize,
    local_disk_per_node: Option<u64>,
    default_processes_per_node: usize,
    memory_per_node: f64,
    maximum_cores_per_job: usize,
) -> Queue {
    Queue {
        cores_per_node,
        numa_per_node,
        local_disk_per_node,
        default_processes_per_node,
        memory_per_node,
        maximum_cores_per_job: Some(maximum_cores_per_job),
    }
}

fn gadi() -> System {
    ////////////////////////////////////////////////////////////////////////////////////////
    // NCI Gadi
    let mut queue_map = BTreeMap::new();
    queue_map.insert("normal".into(), queue(48, 4, Some(400), 48, 190.0, 20_736));
    queue_map.insert("express".into(), queue(48, 4, Some(400), 48, 190.0, 3168));
    queue_map.insert("hugemem".into(), queue(48, 4, Some(400), 48, 1470.0, 192));
    queue_map.insert("megamem".into(), queue(48, 4, Some(400), 48, 2990.0, 96));
    queue_map.insert("copyq".into(), queue(48, 4, Some(400), 48, 190.0, 1));
    // Sapphire Rapids nodes
    queue_map.insert("normalsr".into(), queue(104, 8, Some(400), 104, 500.0, 10_400));
    queue_map.insert("expresssr".into(), queue(104, 8, Some(400), 104, 500.0, 2080));

    System {
        name: "gadi".into(),
        identify: IdentificationMethod::ByHostnamePrefix("gadi".into()),
        scheduler: SchedulerType::Pbs,
        launcher: None,
        default_queue: "normalsr".into(),
        project_variable: "PROJECT".into(),
        required_environment: BTreeSet::from(["MY_GADOPT".into()]),
        header: "#!/usr/bin/env bash".into(),
        prescript: "module use /g/data/fp50/modules\nmodule load firedrake".into(),
        template: DEFAULT_TEMPLATE.into(),
        walltime: None,
        submit_options: vec!["-lstorage=gdata/{project}+scratch/{project}+gdata/fp50".into()],
        queue: queue_map,
    }
}

fn setonix() -> System {
    ////////////////////////////////////////////////////////////////////////////////////////
    // Pawsey Setonix
    let mut queue_map = BTreeMap::new();
    queue_map.insert("work".into(), queue(128, 8, None, 70, 230.0, 176_128));
    queue_map.insert("long".into(), queue(128, 8, None, 70, 230.0, 1024));
    queue_map.insert("highmem".into(), queue(128, 8, None, 70, 980.0, 1024));

    System {
        name: "setonix".into(),
        identify: IdentificationMethod::ByEnvironment("PAWSEY_CLUSTER".into(), "setonix".into()),
        scheduler: SchedulerType::Slurm,
        launcher: None,
        default_queue: "work".into(),
        project_variable: "PAWSEY_PROJECT".into(),
        required_environment: BTreeSet::from(["MY_GADOPT".into()]),
        // Exclude nodes with known faults.
        header: "#!/bin/bash -i\n#SBATCH --exclude=nid00[2024-2055],nid00[2792-2823]\n".into(),
        prescript: "module use /software/projects/pawsey0821/modules\nmodule load firedrake"
            .into(),
        template: DEFAULT_TEMPLATE.into(),
        walltime: None,
        submit_options: Vec::new(),
        queue: queue_map,
    }
}

impl BuiltIn for system::Configuration {
    fn built_in() -> Self {
        let system = vec![gadi(), setonix()];

        system::Configuration { system }
    }
}
