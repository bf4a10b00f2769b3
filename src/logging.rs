use std::sync::{Mutex, OnceLock};

use flexi_logger::{
    style, Age, Cleanup, Criterion, FileSpec, FlexiLoggerError, LevelFilter, Logger,
    LoggerHandle, Naming,
};

// Stores the logger in a global variable to keep it alive.
static LOGGER: OnceLock<Mutex<LoggerHandle>> = OnceLock::new();

/// Starts logging to `log_dir`. `verbose` is the number of `-v` flags.
pub fn setup_logger(verbose: u8, log_dir: &str) -> Result<(), FlexiLoggerError> {
    let loglevel = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let logger = Logger::with(loglevel)
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename("sandbox-namespace")
                .suffix("txt"),
        )
        .format(format_log_message)
        .set_palette("b1;3;2;4;6".to_string())
        .rotate(
            Criterion::Age(Age::Hour),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(7 * 24),
        ) // rotate every hour, keep logs for a week
        .duplicate_to_stderr(flexi_logger::Duplicate::Warn) // duplicate warnings and errors to stderr
        .start()?;

    // to keep the logger alive, we'll store it in a global variable
    if LOGGER.set(Mutex::new(logger)).is_err() {
        eprintln!("The logger was already initialized, keeping the first one.");
    }

    tracing::info!("Logger initialized successfully.");
    Ok(())
}

/// Custom log message formatter: [timestamp]:[level] (module:line) message
pub fn format_log_message(
    write: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &flexi_logger::Record,
) -> std::io::Result<()> {
    let level = record.level();
    write!(
        write,
        "[{}]:{} ({}:{}) {}",
        now.format("%Y-%m-%d %H:%M:%S%.6f"),
        style(level).paint(format!("{:7}", format!("[{}]", level))), // paint the level in a color
        record.module_path().unwrap_or("<unnamed>"),                 // Module from tracing
        record.line().unwrap_or(0), // line number can help with debugging
        record.args()
    ) // the actual message
}
