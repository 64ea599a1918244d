#![warn(clippy::pedantic)]

use clap::Parser;
use log::{error, warn, LevelFilter};
use std::env;
use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;

mod cli;

use cli::{ColorMode, Options};
use hpcrun::LOG_LEVEL_VARIABLE;

fn main_detail() -> Result<i32, Box<dyn Error>> {
    let options = Options::parse();

    let log_style = match options.color {
        ColorMode::Never => "never",
        ColorMode::Always => "always",
        ColorMode::Auto => "auto",
    };
    let log_style = env::var("HPCRUN_LOG_STYLE").unwrap_or_else(|_| log_style.into());

    let requested_level = env::var(LOG_LEVEL_VARIABLE).ok();
    let log_level = requested_level.as_deref().map(cli::log_level);

    env_logger::Builder::new()
        .filter_level(log_level.flatten().unwrap_or(LevelFilter::Warn))
        .parse_write_style(&log_style)
        .try_init()?;

    if let (Some(requested), Some(None)) = (&requested_level, log_level) {
        warn!("{LOG_LEVEL_VARIABLE}={requested} is not a known log level, using warn.");
    }

    let mut output = io::stdout();
    let code = if options.show_system {
        cli::system::system(&options, &mut output)?;
        0
    } else {
        cli::run::run(options, &mut output)?
    };
    output.flush()?;

    Ok(code)
}

fn main() -> ExitCode {
    match main_detail() {
        Ok(code) => u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from),
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
