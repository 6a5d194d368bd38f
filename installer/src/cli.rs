//! CLI argument definitions for parcel.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint so the argument structs can be built directly by
//! tests and library callers.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Fetch, verify, unpack, install and smoke-test prebuilt tools.
#[derive(Parser, Debug)]
#[command(name = "parcel")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, verify, unpack, install and smoke-test prebuilt tools.\n\n",
    "parcel reads a TOML recipe naming a download URL and its SHA-256 digest. ",
    "The artefact is fetched into a private staging directory, checked against ",
    "the digest before anything is unpacked, installed into the binary ",
    "directory and finally run once to prove it works.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install a tool from a recipe:\n",
    "    $ parcel install recipes/ballerina.toml\n\n",
    "  Install into a custom directory for another platform:\n",
    "    $ parcel install tool.toml --bin-dir /opt/bin --platform linux-arm64\n\n",
    "  Re-run the smoke test for an installed tool:\n",
    "    $ parcel test recipes/ballerina.toml\n\n",
    "  List installed tools as JSON:\n",
    "    $ parcel list --json\n\n",
    "ENVIRONMENT:\n",
    "  PARCEL_CONFIG   Path to an alternative settings file\n",
    "  RUST_LOG        Log filter, overriding -v",
))]
pub struct Cli {
    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install a package from a recipe.
    Install(InstallArgs),

    /// Run the smoke test for an installed package.
    Test(TestArgs),

    /// List installed packages.
    List(ListArgs),

    /// Remove an installed package.
    Remove(RemoveArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Recipe file describing the package.
    #[arg(value_name = "RECIPE")]
    pub recipe: Utf8PathBuf,

    /// Directory installed executables are placed in [default: ~/.local/bin].
    #[arg(short, long, value_name = "DIR")]
    pub bin_dir: Option<Utf8PathBuf>,

    /// Parent directory for the per-run staging area [default: system temp].
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Target platform identifier, overriding the recipe and host.
    #[arg(long, value_name = "ID")]
    pub platform: Option<String>,

    /// Reinstall even when the same version is already installed.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the test command.
#[derive(Parser, Debug, Clone, Default)]
pub struct TestArgs {
    /// Recipe file describing the package.
    #[arg(value_name = "RECIPE")]
    pub recipe: Utf8PathBuf,

    /// Directory the package was installed into [default: ~/.local/bin].
    #[arg(short, long, value_name = "DIR")]
    pub bin_dir: Option<Utf8PathBuf>,

    /// Platform the package was installed for [default: from its receipt].
    #[arg(long, value_name = "ID")]
    pub platform: Option<String>,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the remove command.
#[derive(Parser, Debug, Clone, Default)]
pub struct RemoveArgs {
    /// Name of the installed package.
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
