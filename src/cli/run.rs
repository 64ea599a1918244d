// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use log::{debug, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::error::Error;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cli::{self, Options};
use hpcrun::job::{ExtraEnvironment, JobRequest};
use hpcrun::script::ScriptFile;
use hpcrun::submit::Submission;
use hpcrun::system;

/// Build the job request from the command line.
fn request(options: Options) -> Result<JobRequest, Box<dyn Error>> {
    let template = cli::read_optional_file(options.template_file.as_deref())?;
    let header = cli::read_optional_file(options.header_file.as_deref())?;
    let prescript = cli::read_optional_file(options.prescript_file.as_deref())?;

    Ok(JobRequest {
        processes: options.processes.unwrap_or_default(),
        command: options.command,
        environment: options.environment.map(ExtraEnvironment::Text),
        processes_per_node: options.processes_per_node,
        walltime: options.walltime,
        memory: options.memory,
        output: options.output,
        error: options.error,
        job_name: options.job_name,
        queue: options.queue,
        template,
        header,
        prescript,
        save_script: options.save_script,
    })
}

/// Submit the job given on the command line.
///
/// With `--dry-run`, print the job script and submission command instead.
/// The script is still saved when `--save-script` is given.
///
/// # Returns
/// The exit code of the submission command.
///
pub fn run<W: Write>(options: Options, output: &mut W) -> Result<i32, Box<dyn Error>> {
    debug!("Preparing the job.");

    let system = system::Configuration::open()?.identify(options.system.as_deref())?;
    let dry_run = options.dry_run;
    let request = request(options)?;
    let submission = Submission::prepare(&system, &request, dry_run)?;

    if dry_run {
        info!("Dry run, not submitting.");
        if let Some(path) = &request.save_script {
            ScriptFile::create(submission.script(), Some(path.as_path()))?;
        }
        write!(output, "{}", submission.script())?;
        writeln!(output)?;
        writeln!(output, "{}", submission.command().join(" "))?;
        output.flush()?;
        return Ok(0);
    }

    let should_terminate = Arc::new(AtomicBool::new(false));
    flag::register_conditional_shutdown(SIGINT, 10, Arc::clone(&should_terminate))?;
    flag::register(SIGINT, Arc::clone(&should_terminate))?;
    flag::register_conditional_shutdown(SIGTERM, 10, Arc::clone(&should_terminate))?;
    flag::register(SIGTERM, Arc::clone(&should_terminate))?;

    Ok(submission.run(&should_terminate)?)
}
