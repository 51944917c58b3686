use std::process::ExitCode;

use anyhow::Result;
use clap::{Error as ClapError, Parser as _};
use log::error;

mod args;
mod chain;
mod logging;
mod metrics_server;
mod runtime;

use crate::args::GuardianArgs;

fn main() -> ExitCode {
    if let Err(error) = try_main() {
        error.downcast_ref().map(ClapError::exit);
        error!("{error:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main() -> Result<()> {
    let args = GuardianArgs::try_parse()?;

    logging::initialize()?;

    runtime::run(args.try_into()?)
}
