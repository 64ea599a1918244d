use log::{debug, info};
use std::error::Error;
use std::io::Write;

use crate::cli::Options;
use hpcrun::system;

/// Show the system.
///
/// Print the selected system to stdout in toml format.
///
pub fn system<W: Write>(options: &Options, output: &mut W) -> Result<(), Box<dyn Error>> {
    debug!("Showing the system.");

    let systems = system::Configuration::open()?;
    let system = systems.identify(options.system.as_deref())?;
    info!("System configuration for '{}':", system.name);

    write!(output, "{}", &toml::to_string_pretty(&system)?)?;

    Ok(())
}
