//! Run configuration.
//!
//! # Layering
//!
//! ```text
//! defaults  <-  YAML config file (optional)  <-  command-line flags
//! ```
//!
//! Each layer is a [`PartialConfig`]; [`PartialConfig::merge`] lets the later
//! layer win field by field and [`PartialConfig::build`] fills the remaining
//! gaps with defaults and validates the result. A [`Config`] is built once per
//! run and passed by reference to every component that needs it.
//!
//! # File format
//!
//! ```yaml
//! database:
//!   host: 127.0.0.1
//!   port: 3306
//!   name: orders
//!   user: root
//!   password: ""
//! output:
//!   dir: /srv/procedures
//!   author_name: spkeeper
//!   author_email: spkeeper@example.com
//! workers: 5
//! unreadable: fail
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{is_path_component, UnreadablePolicy};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_AUTHOR_NAME: &str = "spkeeper";
pub const DEFAULT_AUTHOR_EMAIL: &str = "spkeeper@example.com";
pub const DEFAULT_WORKERS: usize = 5;

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Validated, read-only configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db: DbConfig,
    pub output: OutputConfig,
    /// Number of concurrent fetch-and-write workers.
    pub workers: usize,
    pub unreadable: UnreadablePolicy,
}

/// Database server connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Output location and commit identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Root directory; holds the repository and one subdirectory per database.
    pub dir: PathBuf,
    pub author_name: String,
    pub author_email: String,
}

impl Config {
    /// Directory the procedures of the configured database are written to:
    /// `<output>/<database>`.
    pub fn procedures_dir(&self) -> PathBuf {
        self.output.dir.join(&self.db.database)
    }

    /// Check every invariant. Called by [`PartialConfig::build`]; public so a
    /// hand-built `Config` can be checked the same way.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutputDir);
        }
        if !self.output.dir.is_dir() {
            return Err(ConfigError::OutputDirNotFound {
                path: self.output.dir.clone(),
            });
        }
        self.db.validate()?;
        if self.output.author_name.is_empty() {
            return Err(ConfigError::MissingField("git author name"));
        }
        if self.output.author_email.is_empty() {
            return Err(ConfigError::MissingField("git author email"));
        }
        if !is_signature_safe(&self.output.author_name) {
            return Err(ConfigError::InvalidAuthor("name"));
        }
        if !is_signature_safe(&self.output.author_email) {
            return Err(ConfigError::InvalidAuthor("email"));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        Ok(())
    }
}

impl DbConfig {
    /// Check the connection fields. The password may be empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.database.is_empty() {
            return Err(ConfigError::MissingField("database name"));
        }
        if !is_path_component(&self.database) {
            return Err(ConfigError::InvalidDatabaseName(self.database.clone()));
        }
        Ok(())
    }
}

fn is_signature_safe(s: &str) -> bool {
    !s.contains(['<', '>', '\n', '\r'])
}

// ---------------------------------------------------------------------------
// Partial layers
// ---------------------------------------------------------------------------

/// One configuration layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub database: PartialDbConfig,
    pub output: PartialOutputConfig,
    pub workers: Option<usize>,
    pub unreadable: Option<UnreadablePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialDbConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialOutputConfig {
    pub dir: Option<PathBuf>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl PartialConfig {
    /// Load a layer from a YAML file.
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Parse` (with path + line context) if it is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit; treat it as an empty layer.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Overlay `overrides` on top of `self`; fields set in `overrides` win.
    pub fn merge(self, overrides: PartialConfig) -> PartialConfig {
        PartialConfig {
            database: PartialDbConfig {
                host: overrides.database.host.or(self.database.host),
                port: overrides.database.port.or(self.database.port),
                name: overrides.database.name.or(self.database.name),
                user: overrides.database.user.or(self.database.user),
                password: overrides.database.password.or(self.database.password),
            },
            output: PartialOutputConfig {
                dir: overrides.output.dir.or(self.output.dir),
                author_name: overrides.output.author_name.or(self.output.author_name),
                author_email: overrides.output.author_email.or(self.output.author_email),
            },
            workers: overrides.workers.or(self.workers),
            unreadable: overrides.unreadable.or(self.unreadable),
        }
    }

    /// Fill defaults and validate.
    pub fn build(self) -> Result<Config, ConfigError> {
        let output = self.output;
        let config = Config {
            db: self.database.resolve(),
            output: OutputConfig {
                dir: output.dir.ok_or(ConfigError::MissingOutputDir)?,
                author_name: output
                    .author_name
                    .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
                author_email: output
                    .author_email
                    .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
            },
            workers: self.workers.unwrap_or(DEFAULT_WORKERS),
            unreadable: self.unreadable.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl PartialDbConfig {
    /// Fill defaults and validate only the connection fields, for commands
    /// that never write output.
    pub fn build(self) -> Result<DbConfig, ConfigError> {
        let db = self.resolve();
        db.validate()?;
        Ok(db)
    }

    fn resolve(self) -> DbConfig {
        DbConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            database: self.name.unwrap_or_default(),
            user: self.user.unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: self.password.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
