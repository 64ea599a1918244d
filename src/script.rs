// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use log::{debug, trace};
use path_absolutize::Absolutize;
use shell_quote::QuoteExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::job::JobSpec;
use crate::template::{self, Values};
use crate::Error;

/// Render job scripts from a template.
///
/// The template may use these placeholders:
/// * `{header}` - usually the interpreter line.
/// * `{directives}` - batch directive lines, blank unless set with
///   `with_directives`.
/// * `{prescript}` - commands that prepare the environment.
/// * `{executor}` - the launch command.
/// * `{command}` - the user's command, quoted for the shell.
///
/// Other brace-enclosed text is left as written.
///
pub struct ScriptBuilder<'a> {
    spec: &'a JobSpec,
    executor: String,
    directives: String,
}

impl<'a> ScriptBuilder<'a> {
    /// Construct a new script builder.
    ///
    /// # Arguments
    /// * `spec`: The resolved job.
    /// * `executor`: The launch command that prefixes the user's command.
    ///
    pub fn new(spec: &'a JobSpec, executor: String) -> Self {
        Self {
            spec,
            executor,
            directives: String::new(),
        }
    }

    /// Set the batch directive lines.
    #[must_use]
    pub fn with_directives(mut self, directives: String) -> Self {
        self.directives = directives;
        self
    }

    /// Render the script.
    pub fn build(&self) -> String {
        let mut command = String::new();
        for (i, argument) in self.spec.command.iter().enumerate() {
            if i > 0 {
                command.push(' ');
            }
            command.push_quoted(shell_quote::Bash, argument.as_str());
        }

        let mut values = Values::new();
        values.insert("header", self.spec.header.clone());
        values.insert("directives", self.directives.clone());
        values.insert("prescript", self.spec.prescript.clone());
        values.insert("executor", self.executor.clone());
        values.insert("command", command);

        template::substitute(&self.spec.template, &values)
    }
}

/// A job script on disk.
///
/// A `Temporary` script is deleted when dropped. A `Saved` script is kept.
#[derive(Debug)]
pub enum ScriptFile {
    Temporary(NamedTempFile),
    Saved(PathBuf),
}

impl ScriptFile {
    /// Write a job script.
    ///
    /// Writes to `save` when given, otherwise to a new temporary file.
    ///
    /// # Errors
    /// Returns `Err(hpcrun::Error)` when the file cannot be created or
    /// written.
    ///
    pub fn create(contents: &str, save: Option<&Path>) -> Result<Self, Error> {
        if let Some(save) = save {
            let path = save
                .absolutize()
                .map_err(|e| Error::FileWrite(save.into(), e))?
                .into_owned();
            fs::write(&path, contents).map_err(|e| Error::FileWrite(path.clone(), e))?;
            debug!("Saved job script to '{}'.", path.display());
            return Ok(ScriptFile::Saved(path));
        }

        let mut file = tempfile::Builder::new()
            .prefix("hpcrun-")
            .suffix(".sh")
            .tempfile()?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| Error::FileWrite(file.path().into(), e))?;
        trace!("Wrote job script to '{}'.", file.path().display());
        Ok(ScriptFile::Temporary(file))
    }

    /// The path to the script.
    pub fn path(&self) -> &Path {
        match self {
            ScriptFile::Temporary(file) => file.path(),
            ScriptFile::Saved(path) => path,
        }
    }
}
