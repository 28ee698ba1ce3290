pub mod migrate;
pub mod status;

use clap::Args;
use procstore_store::StoreEnvironment;
use std::path::PathBuf;

/// Where the units are and which stores to use
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Root directory holding `<repository>/<unit>.sql`
    #[arg(long)]
    pub migrations: PathBuf,

    /// TOML settings file (PROCSTORE_* variables take precedence)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Deployment profile: sqlite or postgres
    #[arg(long)]
    pub profile: Option<String>,

    /// Directory for SQLite database files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl StoreArgs {
    /// Settings environment from the process plus command-line overrides
    pub fn environment(&self) -> StoreEnvironment {
        let mut env = StoreEnvironment::new().with_vars(std::env::vars());
        if let Some(dir) = dirs::config_dir() {
            env = env.with_default_config_dir(dir);
        }
        if let Some(path) = &self.config {
            env = env.with_config_file(path);
        }
        if let Some(profile) = &self.profile {
            env = env.with_var("PROCSTORE_PROFILE", profile.as_str());
        }
        if let Some(dir) = &self.data_dir {
            env = env.with_var("PROCSTORE_SQLITE__DIR", dir.to_string_lossy());
        }
        env
    }
}
