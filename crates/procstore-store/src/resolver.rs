//! Store target resolution
//!
//! Turns the deployment settings into one [`StoreTarget`] per repository.
//! Settings are layered with the `config` crate from an optional TOML file
//! and an explicit map of `PROCSTORE_*` variables. Nothing here reads the
//! process environment; callers capture it at the binary boundary and pass
//! it in through [`StoreEnvironment`].

#![allow(clippy::result_large_err)]

use crate::errors::{configuration_error, Result};
use crate::repository::Repository;
use crate::target::{DialectFlags, EngineKind, SslMode, StoreDescriptor, StoreLocation, StoreTarget};
use config::{Config, Environment, File, FileFormat};
use procstore_types::Sensitive;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "PROCSTORE";

const DEFAULT_JOURNAL_MODE: &str = "WAL";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DATABASES_SUBDIR: &str = "process_engine_runtime/databases";
const SQLITE_EXTENSION: &str = "sqlite";

/// Everything the resolver is allowed to look at
#[derive(Debug, Clone, Default)]
pub struct StoreEnvironment {
    vars: HashMap<String, String>,
    config_file: Option<PathBuf>,
    default_config_dir: Option<PathBuf>,
}

impl StoreEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use these variables (only `PROCSTORE_*` keys are considered)
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Layer a TOML settings file under the variables
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Platform user-config directory used when no sqlite dir is configured
    pub fn with_default_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_config_dir = Some(dir.into());
        self
    }

    /// Merge file and variables into deployment settings
    pub fn load(&self) -> Result<DeploymentSettings> {
        let mut builder = Config::builder();
        if let Some(path) = &self.config_file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(self.vars.clone())),
        );

        let config = builder
            .build()
            .map_err(|e| configuration_error(format!("cannot read settings: {}", e)))?;
        let mut settings: DeploymentSettings = config
            .try_deserialize()
            .map_err(|e| configuration_error(format!("invalid settings: {}", e)))?;
        settings.default_config_dir = self.default_config_dir.clone();
        Ok(settings)
    }
}

/// Raw deployment settings, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// `sqlite` (default) or `postgres`
    pub profile: Option<String>,
    pub sqlite: SqliteSettings,
    pub postgres: PostgresSettings,
    #[serde(skip)]
    pub default_config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub dir: Option<PathBuf>,
    pub journal_mode: Option<String>,
    pub foreign_keys: Option<bool>,
    /// Per-repository file overrides; relative paths are taken from `dir`
    pub files: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<Sensitive<String>>,
    pub ssl_mode: Option<String>,
}

/// A validated deployment profile
#[derive(Debug, Clone)]
pub enum DeploymentProfile {
    /// One database file per repository
    Sqlite {
        base_dir: PathBuf,
        files: HashMap<Repository, PathBuf>,
        flags: DialectFlags,
    },
    /// One shared server database for every repository
    Postgres(StoreDescriptor),
}

impl DeploymentProfile {
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentProfile::Sqlite { .. } => "sqlite",
            DeploymentProfile::Postgres(_) => "postgres",
        }
    }
}

/// Resolves repositories to store targets for one deployment profile
#[derive(Debug, Clone)]
pub struct StoreTargetResolver {
    profile: DeploymentProfile,
}

impl StoreTargetResolver {
    /// Validate `settings`; fails with a configuration error before any
    /// connection could be attempted
    pub fn new(settings: &DeploymentSettings) -> Result<Self> {
        let name = settings
            .profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("sqlite");

        let profile = match name.to_ascii_lowercase().as_str() {
            "sqlite" => sqlite_profile(settings)?,
            "postgres" => postgres_profile(&settings.postgres)?,
            other => {
                return Err(configuration_error(format!(
                    "unsupported deployment profile '{}'",
                    other
                )))
            }
        };
        Ok(Self { profile })
    }

    /// Load settings from `env` and validate them
    pub fn from_environment(env: &StoreEnvironment) -> Result<Self> {
        Self::new(&env.load()?)
    }

    pub fn profile(&self) -> &DeploymentProfile {
        &self.profile
    }

    /// Store target for `repository`
    pub fn resolve(&self, repository: Repository) -> Result<StoreTarget> {
        let descriptor = match &self.profile {
            DeploymentProfile::Sqlite {
                base_dir,
                files,
                flags,
            } => {
                let path = files.get(&repository).cloned().unwrap_or_else(|| {
                    base_dir.join(format!("{}.{}", repository.as_str(), SQLITE_EXTENSION))
                });
                StoreDescriptor {
                    engine: EngineKind::Sqlite,
                    location: StoreLocation::File(path),
                    flags: flags.clone(),
                }
            }
            DeploymentProfile::Postgres(descriptor) => descriptor.clone(),
        };
        Ok(StoreTarget {
            repository,
            descriptor,
        })
    }

    /// Store target for a repository given by name
    pub fn resolve_named(&self, repository: &str) -> Result<StoreTarget> {
        self.resolve(repository.parse()?)
    }

    /// Targets of every repository, in enumeration order
    pub fn resolve_all(&self) -> Result<Vec<StoreTarget>> {
        Repository::ALL.into_iter().map(|r| self.resolve(r)).collect()
    }
}

fn sqlite_profile(settings: &DeploymentSettings) -> Result<DeploymentProfile> {
    let sqlite = &settings.sqlite;
    let base_dir = match (&sqlite.dir, &settings.default_config_dir) {
        (Some(dir), _) => {
            ensure_directory_or_absent(dir)?;
            dir.clone()
        }
        (None, Some(config_dir)) => config_dir.join(DATABASES_SUBDIR),
        (None, None) => {
            return Err(configuration_error(
                "no sqlite directory configured and no default config directory available",
            ))
        }
    };

    let mut files = HashMap::new();
    for (name, file) in &sqlite.files {
        let repository: Repository = name.parse()?;
        let path = if file.is_absolute() {
            file.clone()
        } else {
            base_dir.join(file)
        };
        files.insert(repository, path);
    }

    let journal_mode = sqlite
        .journal_mode
        .clone()
        .unwrap_or_else(|| DEFAULT_JOURNAL_MODE.to_string());

    Ok(DeploymentProfile::Sqlite {
        base_dir,
        files,
        flags: DialectFlags::Sqlite {
            journal_mode,
            foreign_keys: sqlite.foreign_keys.unwrap_or(true),
        },
    })
}

fn ensure_directory_or_absent(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(configuration_error(format!(
            "sqlite directory {} exists but is not a directory",
            dir.display()
        )));
    }
    Ok(())
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| configuration_error(format!("postgres profile requires '{}'", field)))
}

fn postgres_profile(postgres: &PostgresSettings) -> Result<DeploymentProfile> {
    let host = required(&postgres.host, "host")?;
    let database = required(&postgres.database, "database")?;
    let username = required(&postgres.username, "username")?;

    let ssl_mode = match postgres.ssl_mode.as_deref() {
        None => SslMode::Prefer,
        Some(mode) => SslMode::parse(mode).ok_or_else(|| {
            configuration_error(format!(
                "unsupported ssl_mode '{}' (expected disable, prefer or require)",
                mode
            ))
        })?,
    };

    Ok(DeploymentProfile::Postgres(StoreDescriptor {
        engine: EngineKind::Postgres,
        location: StoreLocation::Server {
            host,
            port: postgres.port.unwrap_or(DEFAULT_POSTGRES_PORT),
            database,
            username,
            password: postgres.password.clone().unwrap_or_default(),
        },
        flags: DialectFlags::Postgres { ssl_mode },
    }))
}
