// Sandbox-Namespace: prepares and guards the Python namespace for generated analysis code.

pub mod config; // for reading the settings from the environment
pub mod environment; // dependency guard and namespace builder
