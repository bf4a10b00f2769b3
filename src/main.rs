// Sandbox-Namespace: prepares and guards the Python namespace for generated analysis code

use std::collections::BTreeMap;

use clap::Parser;
use dotenvy::dotenv;
use itertools::Itertools;
use pyo3::prelude::*;
use tracing::{error, info, trace};

use sandbox_namespace::config::Settings;
use sandbox_namespace::environment::{DependencyDescriptor, DependencyGuard, EnvironmentBuilder};

mod cla_parser; // for parsing the command line arguments
mod logging; // for setting up the logger
mod runtime_checks; // for checking the installed libraries

fn main() {
    // What the user has passed in the command line
    let args = cla_parser::Args::parse();

    // Read from env file. This loads the environment variables from the .env file into `std::env::var`.
    let env_file = dotenv();
    let settings = Settings::from_env();

    if let Err(e) = logging::setup_logger(args.verbose, &settings.log_dir) {
        eprintln!("Error initializing the logger: {e}");
        std::process::exit(1);
    }
    match env_file {
        Ok(env_file) => info!("Reading from env file: {:?}", env_file),
        Err(e) => trace!("No env file read ({e}), using the process environment only."),
    }
    // Only now can problems with the settings reach the log file.
    settings.report_problems();

    let guard = DependencyGuard::system().with_min_versions(&settings.min_versions);
    let builder = EnvironmentBuilder::new(guard);
    let secure = args.mode.unwrap_or(settings.mode).is_secure();

    pyo3::prepare_freethreaded_python();
    let exit_code = Python::with_gil(|py| {
        if args.runtime_checks {
            return if runtime_checks::run_runtime_checks(py, &builder) {
                info!("All runtime checks passed.");
                0
            } else {
                error!("Some runtime checks failed.");
                1
            };
        }

        if let Some(module) = &args.check {
            return check_dependency(py, &builder, module, &args);
        }

        print_namespace(py, &builder, &args.deps, secure)
    });

    std::process::exit(exit_code);
}

/// Runs a single module through the dependency guard and prints its version.
fn check_dependency(
    py: Python<'_>,
    builder: &EnvironmentBuilder,
    module: &str,
    args: &cla_parser::Args,
) -> i32 {
    let resolved = builder.guard().resolve_versioned(
        py,
        module,
        args.min_version.as_deref(),
        args.hint.as_deref(),
    );
    match resolved {
        Ok((_, found)) => {
            info!("{module} is usable (version {found}).");
            println!("{module} {found}");
            0
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            1
        }
    }
}

/// Builds the namespace and prints every name with the Python type bound to it, as JSON.
fn print_namespace(py: Python<'_>, builder: &EnvironmentBuilder, deps: &str, secure: bool) -> i32 {
    let descriptors = match DependencyDescriptor::parse_list(deps) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            error!("The dependency list is not valid JSON: {e}");
            eprintln!("The dependency list is not valid JSON: {e}");
            return 1;
        }
    };

    let namespace = match builder.build(py, &descriptors, secure) {
        Ok(namespace) => namespace,
        Err(e) => {
            error!("Couldn't build the execution namespace: {e}");
            eprintln!("Couldn't build the execution namespace: {e}");
            return 1;
        }
    };

    let globals = namespace.into_globals();
    let names: BTreeMap<String, String> = globals
        .iter()
        .map(|(key, value)| {
            let type_name = value
                .get_type()
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            (key.to_string(), type_name)
        })
        .collect();
    trace!("Namespace names: {}", names.keys().join(", "));

    match serde_json::to_string_pretty(&names) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            error!("Couldn't serialize the namespace listing: {e}");
            eprintln!("Couldn't serialize the namespace listing: {e}");
            1
        }
    }
}
