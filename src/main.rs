use std::process::ExitCode;

use clap::Parser;
use printdesigner::cli::{self, CliArgs};
use printdesigner::logger;
use printdesigner::settings::EditorSettings;

fn main() -> ExitCode {
    let settings = EditorSettings::load();

    // Session log (overwrites previous session log)
    logger::init(settings.tracing_level());

    let args = CliArgs::parse();
    cli::run(args, settings)
}
