//! Connection profiles and output helpers for kvsweep.

pub mod config;
pub mod output;

pub use config::{Config, Profile, load_config, mask_secret};
pub use output::{Output, OutputFormat};
