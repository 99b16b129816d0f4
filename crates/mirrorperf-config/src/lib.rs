//! # mirrorperf configuration
//!
//! Configuration for the oc-mirror performance harness:
//!
//! - [`HarnessConfig`]: registry, iteration count, comparison mode, sampling cadence
//! - [`Version`]: the per-version oc-mirror flag table
//! - [`WorkspaceLayout`]: every directory the harness uses, derived from one root
//! - [`imageset`]: ImageSetConfiguration generation for both API versions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod harness;
pub mod imageset;
mod layout;
mod version;

pub use error::{ConfigError, ConfigResult};
pub use harness::{HarnessConfig, RegistryAddress, CONFIG_ENV_VAR, DEFAULT_REGISTRY_PORT};
pub use imageset::{write_imageset_config, ImageSetConfiguration, PackageSpec};
pub use layout::WorkspaceLayout;
pub use version::Version;
