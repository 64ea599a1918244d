// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

//! Build scheduler flags from a resolved job.

use log::{debug, trace};

use crate::job::JobSpec;
use crate::scheduler::Flag;
use crate::system::System;
use crate::template::{self, Quoting, Values};
use crate::Error;

/// Build the command that submits a job.
///
/// The command starts with the scheduler's submission program followed by
/// the flags of every requested category in `Flag::ORDER`. The caller appends
/// the script path.
///
/// # Errors
/// `Err(hpcrun::Error::ScriptBuild)` when a value cannot be quoted or a
/// rendered flag cannot be split into arguments.
///
pub fn submit_command(system: &System, spec: &JobSpec) -> Result<Vec<String>, Error> {
    let scheduler = system.scheduler();
    let values = spec.format_values(scheduler);

    let mut command = vec![scheduler.submit_command().to_string()];
    for flag in Flag::ORDER.into_iter().filter(|f| spec.requests(*f)) {
        for rendered in render_flags(flag, system, spec, &values)? {
            command.extend(split(&rendered)?);
        }
    }

    debug!("Built submission command {command:?}.");
    Ok(command)
}

/// Build the batch directive lines for a job script.
///
/// Each flag becomes one line starting with the scheduler's directive
/// prefix. Values are shell quoted. Exported variables and blocking are
/// omitted.
///
/// # Errors
/// `Err(hpcrun::Error::ScriptBuild)` when a value cannot be quoted or a
/// rendered flag cannot be split into arguments.
///
pub fn directives(system: &System, spec: &JobSpec) -> Result<String, Error> {
    let scheduler = system.scheduler();
    let values = spec.format_values(scheduler);

    let mut lines = Vec::new();
    for flag in Flag::ORDER
        .into_iter()
        .filter(|f| f.is_directive() && spec.requests(*f))
    {
        for rendered in render_flags(flag, system, spec, &values)? {
            split(&rendered)?;
            lines.push(format!("{} {rendered}", scheduler.directive_prefix()));
        }
    }

    Ok(lines.join("\n"))
}

/// Quote a value so that it survives splitting as part of one word.
///
/// Outside quotes the value is shell quoted. Inside a quoted span it is
/// escaped for that span, so a template may quote its own placeholders.
fn quote(key: &str, value: &str, quoting: Quoting) -> Result<String, Error> {
    if value.contains('\0') {
        return Err(Error::ScriptBuild(format!(
            "Unable to quote {key}: it contains a nul byte."
        )));
    }

    Ok(match quoting {
        Quoting::Unquoted => shlex::try_quote(value)
            .map_err(|e| Error::ScriptBuild(format!("Unable to quote {key}: {e}")))?
            .into_owned(),
        Quoting::Single => value.replace('\'', r"'\''"),
        Quoting::Double => {
            let mut escaped = String::with_capacity(value.len());
            for c in value.chars() {
                if matches!(c, '"' | '\\' | '$' | '`') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped
        }
    })
}

/// Substitute quoted values into a flag template.
fn render(template: &str, values: &Values<'_>) -> Result<String, Error> {
    template::try_substitute_quoted(template, |key, quoting| {
        values
            .get(key)
            .map(|value| quote(key, value, quoting))
            .transpose()
    })
}

/// Render the flags of one category.
fn render_flags(
    flag: Flag,
    system: &System,
    spec: &JobSpec,
    values: &Values<'_>,
) -> Result<Vec<String>, Error> {
    let scheduler = system.scheduler();
    let rendered: Vec<String> = match flag {
        Flag::SizeSpecific => scheduler.size_specific_flags(&spec.geometry()),
        Flag::Extras => scheduler
            .flags(flag)
            .iter()
            .copied()
            .chain(system.submit_options.iter().map(String::as_str))
            .map(|t| render(t, values))
            .collect::<Result<Vec<_>, _>>()?,
        _ => scheduler
            .flags(flag)
            .iter()
            .map(|t| render(t, values))
            .collect::<Result<Vec<_>, _>>()?,
    };
    trace!("Rendered {flag:?} flags as {rendered:?}.");
    Ok(rendered)
}

/// Split a rendered flag into arguments.
fn split(rendered: &str) -> Result<Vec<String>, Error> {
    shlex::split(rendered)
        .ok_or_else(|| Error::ScriptBuild(format!("Unable to split '{rendered}' into arguments.")))
}
