// Settings read from the environment (after dotenvy has loaded the .env file).

use std::collections::HashMap;

use tracing::{error, trace};

/// Whether generated code gets the restricted or the native namespace.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    #[default]
    Secure,
    Insecure,
}

impl Mode {
    pub fn is_secure(self) -> bool {
        self == Mode::Secure
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Used when the command line doesn't choose a mode.
    pub mode: Mode,
    /// Minimum versions on top of the built-in table, keyed by top-level package.
    pub min_versions: HashMap<String, String>,
    pub log_dir: String,
    /// Invalid values that were replaced by defaults, reported once logging is up.
    pub problems: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mode: Mode::Secure,
            min_versions: HashMap::new(),
            log_dir: "./logs".to_string(),
            problems: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Invalid values are reported and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Settings::default();

        if let Some(mode) = lookup("SANDBOX_MODE") {
            match mode.trim().parse::<Mode>() {
                Ok(mode) => settings.mode = mode,
                Err(e) => settings.problems.push(format!(
                    "Invalid SANDBOX_MODE {mode:?} ({e}). Falling back to secure mode."
                )),
            }
        }

        if let Some(versions) = lookup("SANDBOX_MIN_VERSIONS") {
            settings.min_versions = parse_min_versions(&versions, &mut settings.problems);
        }

        if let Some(log_dir) = lookup("SANDBOX_LOG_DIR").filter(|dir| !dir.trim().is_empty()) {
            settings.log_dir = log_dir;
        }

        trace!("Settings: {settings:?}");
        settings
    }

    /// Logs every value that was replaced by its default.
    pub fn report_problems(&self) {
        for problem in &self.problems {
            error!("{problem}");
            eprintln!("{problem}");
        }
    }
}

/// Parses `numpy=1.22,pandas=1.5`. Malformed entries are skipped and noted in `problems`.
pub fn parse_min_versions(input: &str, problems: &mut Vec<String>) -> HashMap<String, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((package, version)) if !package.trim().is_empty() && !version.trim().is_empty() => {
                Some((package.trim().to_string(), version.trim().to_string()))
            }
            _ => {
                problems.push(format!(
                    "Ignoring malformed entry {entry:?} in SANDBOX_MIN_VERSIONS."
                ));
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings, Settings::default());
        assert!(settings.mode.is_secure());
    }

    #[test]
    fn test_reads_all_variables() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SANDBOX_MODE", "Insecure"),
            ("SANDBOX_MIN_VERSIONS", "numpy=1.22, pandas = 1.5"),
            ("SANDBOX_LOG_DIR", "/app/logs"),
        ]));
        assert_eq!(settings.mode, Mode::Insecure);
        assert_eq!(settings.min_versions.get("numpy").map(String::as_str), Some("1.22"));
        assert_eq!(settings.min_versions.get("pandas").map(String::as_str), Some("1.5"));
        assert_eq!(settings.log_dir, "/app/logs");
    }

    #[test]
    fn test_invalid_mode_stays_secure() {
        let settings = Settings::from_lookup(lookup_from(&[("SANDBOX_MODE", "yolo")]));
        assert_eq!(settings.mode, Mode::Secure);
        assert_eq!(settings.problems.len(), 1);
        assert!(settings.problems[0].contains("SANDBOX_MODE"));
    }

    #[test]
    fn test_malformed_versions_are_skipped() {
        let mut problems = Vec::new();
        let parsed = parse_min_versions("numpy,=1.0,pandas=,matplotlib=3.5,,", &mut problems);
        assert_eq!(problems.len(), 3);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("matplotlib").map(String::as_str), Some("3.5"));
    }

    #[test]
    fn test_mode_display_round_trips() {
        assert_eq!(Mode::Secure.to_string(), "secure");
        assert_eq!("insecure".parse::<Mode>(), Ok(Mode::Insecure));
    }
}
