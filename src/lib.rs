pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};

pub use adapters::TokioProcessRunner;
pub use config::toml_config::LauncherConfig;
pub use core::launcher::{ConvertArgs, FlowRequest, LaunchOutcome, Launcher, MarkArgs};
pub use utils::error::{LauncherError, Result};
