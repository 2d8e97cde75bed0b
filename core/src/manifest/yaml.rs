use std::{
    env,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use dotenv::{dotenv, from_path};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::database::batch_operations::ConfigError;
use crate::database::sqlite::client::connection_string;
use crate::manifest::config::WriterConfig;

pub const YAML_CONFIG_NAME: &str = "sqlsink.yaml";

fn default_buffer() -> usize {
    100
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,

    /// SQLite database file. Falls back to `DATABASE_URL`, then `./sqlsink.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Capacity of the channels between stages.
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    pub writer: WriterConfig,
}

impl Manifest {
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(connection_string)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReadManifestError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse manifest: {0}")]
    CouldNotParseManifest(#[from] serde_yaml::Error),

    #[error("Environment variable {0} not found")]
    EnvironmentVariableNotFound(String),

    #[error("Invalid environment variable pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid manifest: {0}")]
    Invalid(#[from] ConfigError),
}

/// Replaces `${VAR}` placeholders with values from the environment.
fn substitute_env_variables(contents: &str) -> Result<String, ReadManifestError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;

    let mut missing = None;
    let result = re.replace_all(contents, |caps: &Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                error!("Environment variable {} not found", var_name);
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ReadManifestError::EnvironmentVariableNotFound(var_name)),
        None => Ok(result.into_owned()),
    }
}

fn load_env(file_path: &Path) {
    match file_path.parent().map(|dir| dir.join(".env")) {
        Some(env_file) if env_file.exists() => {
            from_path(&env_file).ok();
        }
        _ => {
            dotenv().ok();
        }
    }
}

pub fn parse_manifest(contents: &str) -> Result<Manifest, ReadManifestError> {
    let contents = substitute_env_variables(contents)?;
    let manifest: Manifest = serde_yaml::from_str(&contents)?;
    manifest.writer.validate()?;
    Ok(manifest)
}

/// Reads a manifest, loading the `.env` next to it (or in the working directory) first.
pub fn read_manifest(file_path: &PathBuf) -> Result<Manifest, ReadManifestError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    load_env(file_path);

    parse_manifest(&contents)
}
