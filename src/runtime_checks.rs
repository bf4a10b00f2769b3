use std::ffi::CString;
use std::io::Write;

use pyo3::prelude::*;
use tracing::{debug, error, info, warn};

use sandbox_namespace::environment::builder::{NUMERIC, PLOTTING, TABULAR};
use sandbox_namespace::environment::{version, EnvironmentBuilder, Importer};

/// Libraries generated analysis code commonly asks for.
/// Their absence is reported but doesn't fail the checks.
const OPTIONAL_LIBRARIES: [&str; 12] = [
    "xarray",
    "scipy",
    "seaborn",
    "shapely",
    "pyproj",
    "netCDF4",
    "cftime",
    "cartopy",
    "PIL", // This is the pillow library, but it's imported as PIL
    "shapefile", // pyshp
    "sklearn",
    "statsmodels",
];

const INSTALL_HINT: &str = "The execution environment needs matplotlib, numpy and pandas.";

/// Helper function to flush stdout and stderr.
fn flush_stdout_stderr() {
    if let Err(e) = std::io::stdout().flush() {
        error!("Error flushing stdout: {e:?}",);
        eprintln!("Error flushing stdout: {e:?}",);
    }
    if let Err(e) = std::io::stderr().flush() {
        error!("Error flushing stderr: {e:?}",);
        eprintln!("Error flushing stderr: {e:?}",);
    }
}

/// Checks that the installed Python libraries can actually back an execution namespace:
/// - The core libraries resolve and are recent enough.
/// - Optional libraries are looked up and reported.
/// - Secure and insecure namespaces come out as expected.
///
/// Returns whether every required check passed.
pub fn run_runtime_checks<I: Importer>(py: Python<'_>, builder: &EnvironmentBuilder<I>) -> bool {
    print!("Checking the core libraries... ");
    flush_stdout_stderr();
    info!("Checking the core libraries.");
    let core_ok = check_core_libraries(py, builder);
    if core_ok {
        println!("Success!");
    } else {
        println!("Failed!");
        // Nothing below can work without them.
        return false;
    }

    print!("Probing optional libraries... ");
    flush_stdout_stderr();
    let available = check_optional_libraries(py, builder);
    println!("{available}/{} available.", OPTIONAL_LIBRARIES.len());

    print!("Checking the secure namespace... ");
    flush_stdout_stderr();
    info!("Checking the secure namespace.");
    let secure_ok = check_secure_namespace(py, builder);
    println!("{}", if secure_ok { "Success!" } else { "Failed!" });

    print!("Checking the insecure namespace... ");
    flush_stdout_stderr();
    info!("Checking the insecure namespace.");
    let insecure_ok = check_insecure_namespace(py, builder);
    println!("{}", if insecure_ok { "Success!" } else { "Failed!" });
    flush_stdout_stderr();

    secure_ok && insecure_ok
}

fn check_core_libraries<I: Importer>(py: Python<'_>, builder: &EnvironmentBuilder<I>) -> bool {
    let mut all_ok = true;
    for core in [&PLOTTING, &NUMERIC, &TABULAR] {
        match builder
            .guard()
            .resolve(py, core.module, None, Some(INSTALL_HINT))
        {
            Ok(module) => debug!("{} resolved: {:?}", core.module, version(&module).ok()),
            Err(e) => {
                error!("Core library {} is not usable: {e}", core.module);
                eprintln!("Core library {} is not usable: {e}", core.module);
                all_ok = false;
            }
        }
    }
    all_ok
}

fn check_optional_libraries<I: Importer>(py: Python<'_>, builder: &EnvironmentBuilder<I>) -> usize {
    OPTIONAL_LIBRARIES
        .iter()
        .filter(|library| builder.guard().resolve_optional(py, library, None).is_some())
        .count()
}

fn check_secure_namespace<I: Importer>(py: Python<'_>, builder: &EnvironmentBuilder<I>) -> bool {
    let namespace = match builder.build(py, &[], true) {
        Ok(namespace) => namespace,
        Err(e) => {
            error!("Couldn't build the secure namespace: {e}");
            return false;
        }
    };
    if !matches!(namespace.is_restricted(), Ok(true)) {
        error!("The secure namespace exposes the native pandas module!");
        return false;
    }

    let globals = namespace.into_globals();
    // Plain computation must work, escape hatches must not.
    let expectations = [
        ("x = np.arange(3).sum()", true),
        ("frame = pd.DataFrame({'a': [1, 2]})", true),
        ("open('/etc/hostname')", false),
        ("import os", false),
        ("pd.read_csv('/etc/hostname')", false),
    ];
    expectations.iter().all(|(code, should_succeed)| {
        let Ok(code_cstr) = CString::new(*code) else {
            return false;
        };
        let succeeded = py.run(&code_cstr, Some(&globals), None).is_ok();
        if succeeded != *should_succeed {
            error!("Secure namespace check failed for `{code}`: expected success = {should_succeed}");
        }
        succeeded == *should_succeed
    })
}

fn check_insecure_namespace<I: Importer>(py: Python<'_>, builder: &EnvironmentBuilder<I>) -> bool {
    match builder.build(py, &[], false) {
        Ok(namespace) => match namespace.is_restricted() {
            Ok(false) => true,
            Ok(true) => {
                error!("The insecure namespace got the restricted wrapper.");
                false
            }
            Err(e) => {
                warn!("Couldn't inspect the insecure namespace: {e}");
                false
            }
        },
        Err(e) => {
            error!("Couldn't build the insecure namespace: {e}");
            false
        }
    }
}
