// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use indicatif::HumanDuration;
use log::{debug, error, info, trace};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::command;
use crate::job::{JobRequest, JobSpec};
use crate::script::{ScriptBuilder, ScriptFile};
use crate::system::System;
use crate::Error;

/// A job ready to submit.
///
/// `Submission` holds the submission command and rendered job script for
/// one resolved job. Each submission is independent of every other.
///
#[derive(Debug)]
pub struct Submission {
    spec: JobSpec,
    command: Vec<String>,
    script: String,
    save_script: Option<PathBuf>,
}

impl Submission {
    /// Resolve a request and build the submission command and job script.
    ///
    /// Batch directives are written into the script when `dry_run` is set
    /// or the request saves the script. They are left out otherwise because
    /// the same flags are given on the command line.
    ///
    /// # Errors
    /// Returns `Err(hpcrun::Error)` when the request cannot be resolved or
    /// the command cannot be built.
    ///
    pub fn prepare(system: &System, request: &JobRequest, dry_run: bool) -> Result<Self, Error> {
        let spec = request.resolve(system)?;
        Self::from_spec(system, spec, request.save_script.clone(), dry_run)
    }

    fn from_spec(
        system: &System,
        spec: JobSpec,
        save_script: Option<PathBuf>,
        dry_run: bool,
    ) -> Result<Self, Error> {
        info!("Will run the following command:\n{}", spec.command.join(" "));

        let command = command::submit_command(system, &spec)?;
        let executor = system.launcher().prefix(&spec.geometry());

        let mut builder = ScriptBuilder::new(&spec, executor);
        if dry_run || save_script.is_some() {
            builder = builder.with_directives(command::directives(system, &spec)?);
        }
        let script = builder.build();

        Ok(Self {
            spec,
            command,
            script,
            save_script,
        })
    }

    /// The resolved job.
    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// The submission command, without the script path.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The rendered job script.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Submit the job and wait for the submission command to exit.
    ///
    /// The job script is written to a temporary file (or the requested save
    /// path) that lives until the command exits. When `should_terminate` is
    /// set, the submission command is sent SIGINT and waited on.
    ///
    /// # Returns
    /// The exit code of the submission command, or 128 plus the signal number
    /// when a signal ended it.
    ///
    /// # Errors
    /// Returns `Err(hpcrun::Error)` when the script cannot be written or the
    /// command cannot be started.
    ///
    pub fn run(&self, should_terminate: &Arc<AtomicBool>) -> Result<i32, Error> {
        let script_file = ScriptFile::create(&self.script, self.save_script.as_deref())?;

        let (program, arguments) = self
            .command
            .split_first()
            .ok_or_else(|| Error::ScriptBuild("Empty submission command.".into()))?;

        info!(
            "Submitting with: {} {}",
            self.command.join(" "),
            script_file.path().display()
        );
        info!("Job script:\n{}", self.script);

        let instant = Instant::now();
        let mut child = Command::new(program)
            .args(arguments)
            .arg(script_file.path())
            .spawn()
            .map_err(|e| Error::SubmissionFailure(program.clone(), e))?;

        trace!("Waiting for {program} to complete.");
        let status = loop {
            if should_terminate.load(Ordering::Relaxed) {
                error!("Interrupted! Stopping {program}.");
                #[allow(clippy::cast_possible_wrap)]
                signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGINT)?;
                break child
                    .wait()
                    .map_err(|e| Error::SubmissionFailure(program.clone(), e))?;
            }

            thread::sleep(Duration::from_millis(10));

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => continue,
                Err(e) => return Err(Error::SubmissionFailure(program.clone(), e)),
            }
        };

        let code = match status.code() {
            Some(code) => code,
            None => 128 + status.signal().unwrap_or_default(),
        };

        if code == 0 {
            info!(
                "Job completed successfully in {}.",
                HumanDuration(instant.elapsed())
            );
        } else {
            error!(
                "Job exited with status {code} after {}.",
                HumanDuration(instant.elapsed())
            );
        }

        drop(script_file);
        debug!("Released the job script.");
        Ok(code)
    }
}

/// Submit a job on the current system and wait for it to finish.
///
/// Detects the system, resolves `request`, submits the job and blocks until
/// the scheduler's submission command returns.
///
/// # Returns
/// The exit code of the submission command.
///
/// # Errors
/// Returns `Err(hpcrun::Error)` when any step before the command starts fails.
///
pub fn submit(request: &JobRequest) -> Result<i32, Error> {
    let system = System::detect()?;
    let submission = Submission::prepare(&system, request, false)?;
    submission.run(&Arc::new(AtomicBool::new(false)))
}
