use crate::cli::SiegeCli;
use clap::Parser;

/// Initialise logging and parse the command line.
pub fn init() -> SiegeCli {
    env_logger::init();

    SiegeCli::parse()
}
