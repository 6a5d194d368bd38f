//! parcel CLI entrypoint.
//!
//! Parses arguments, initialises logging, loads settings and dispatches to
//! the command handlers in the library. Any failure is reported as a single
//! line on stderr and exits with status 1.

use clap::Parser;
use log::LevelFilter;
use parcel_installer::cli::{Cli, Command};
use parcel_installer::dirs::SystemBaseDirs;
use parcel_installer::error::{InstallerError, Result};
use parcel_installer::install_flow::{run_install, run_test};
use parcel_installer::list::run_list;
use parcel_installer::output::write_stderr_line;
use parcel_installer::remove::run_remove;
use parcel_installer::settings::Settings;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity, cli.quiet);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Initialise `env_logger` from the `-v` count; `RUST_LOG` overrides it.
fn init_logging(verbosity: u8, quiet: bool) {
    env_logger::Builder::new()
        .filter_level(level_for(verbosity, quiet))
        .format_timestamp(None)
        .parse_env(env_logger::Env::default())
        .init();
}

fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<()> {
    let dirs = SystemBaseDirs::new().ok_or(InstallerError::DirectoryUnavailable { what: "home" })?;
    let settings = Settings::load(&dirs)?;

    match &cli.command {
        Command::Install(args) => {
            run_install(args, cli.quiet, &settings, &dirs, stderr)?;
        }
        Command::Test(args) => {
            run_test(args, cli.quiet, &settings, &dirs, stderr)?;
        }
        Command::List(args) => run_list(args, &settings, &dirs, stdout)?,
        Command::Remove(args) => {
            run_remove(args, cli.quiet, &settings, &dirs, stderr)?;
        }
    }
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
