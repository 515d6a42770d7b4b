pub mod check_config;
pub mod serve;

use anyhow::Result;
use std::path::Path;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load from an explicit file, or from the default locations.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}
