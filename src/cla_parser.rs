// For parsing the command line arguments

use clap::{self, crate_authors, Parser};

use sandbox_namespace::config::Mode;

#[derive(Parser, Debug)]
#[command(
    version, // Automatically fills in the version from Cargo.toml
    about = "Sandbox-Namespace: prepares the Python namespace for generated analysis code",
    long_about = "Sandbox-Namespace: Resolves and version-checks the libraries generated code may use and assembles the namespace (restricted or native) it will be executed in. Prints the resulting names, checks a single dependency, or runs the startup checks.",
    author = crate_authors!(),
)]
pub struct Args {
    /// Make the program verbose, printing debug info too, then trace info. Can be used multiple times.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Additional dependencies as a JSON list, e.g. '[{"alias": "sns", "module": "seaborn"}]'.
    #[arg(long, default_value = "[]")]
    pub deps: String,

    /// Whether to build the restricted or the native namespace. Defaults to SANDBOX_MODE, then secure.
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Only check that the given module can be imported and is recent enough.
    #[arg(long, value_name = "MODULE")]
    pub check: Option<String>,

    /// Minimum version for --check.
    #[arg(long, requires = "check")]
    pub min_version: Option<String>,

    /// Text appended to the error message of --check, e.g. install instructions.
    #[arg(long, requires = "check")]
    pub hint: Option<String>,

    /// Runs the startup checks against the installed Python libraries and exits.
    #[arg(long, conflicts_with = "check")]
    pub runtime_checks: bool,
}
