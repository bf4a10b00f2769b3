// Everything needed to prepare the namespace generated code is executed in.
// Running the code is left to the caller.

pub mod builder;
pub mod builtins;
pub mod dependency_guard;
pub mod errors;
pub mod restricted_pandas;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{get_environment, DependencyDescriptor, EnvironmentBuilder, ExecutionNamespace};
pub use dependency_guard::{version, DependencyGuard, Importer, SystemImporter};
pub use errors::{DependencyMissing, EnvironmentError, MissingCause};
pub use restricted_pandas::RestrictedPandas;
