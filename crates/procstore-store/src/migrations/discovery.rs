//! Migration unit discovery
//!
//! Units live on disk as `<root>/<repository>/<unit-id>.sql`. A unit may
//! instead (or additionally) ship `<unit-id>.sqlite.sql` and/or
//! `<unit-id>.postgres.sql`; the variant for the store's dialect wins over
//! the generic script.

#![allow(clippy::result_large_err)]

use crate::db::Dialect;
use crate::errors::{configuration_error, io_error, migration_unit_error, Result};
use crate::migrations::checksums::compute_checksum;
use crate::repository::Repository;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A schema script ready to run against one dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub id: String,
    pub path: PathBuf,
    pub sql: String,
    pub checksum: String,
}

#[derive(Debug, Default)]
struct Candidates {
    generic: Option<PathBuf>,
    variants: BTreeMap<&'static str, PathBuf>,
}

impl Candidates {
    fn pick(&self, dialect: Dialect) -> Option<&PathBuf> {
        self.variants
            .get(dialect.as_str())
            .or(self.generic.as_ref())
    }
}

/// Split a file name into (unit id, dialect variant)
fn classify(file_name: &str) -> Option<(String, Option<&'static str>)> {
    let stem = file_name.strip_suffix(".sql")?;
    for dialect in [Dialect::Sqlite, Dialect::Postgres] {
        let suffix = format!(".{}", dialect.as_str());
        if let Some(id) = stem.strip_suffix(&suffix) {
            return Some((id.to_string(), Some(dialect.as_str())));
        }
    }
    Some((stem.to_string(), None))
}

/// Check that the migrations root is an existing directory
///
/// Individual repository directories may be absent; the root itself may not,
/// or a mistyped path would boot against unmigrated stores.
pub fn ensure_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(configuration_error(format!(
            "migrations root {} does not exist or is not a directory",
            root.display()
        )));
    }
    Ok(())
}

/// Units of `repository` for `dialect`, in ascending identifier order
///
/// A missing repository directory means the repository has no units.
pub fn discover(root: &Path, repository: Repository, dialect: Dialect) -> Result<Vec<MigrationUnit>> {
    let dir = root.join(repository.as_str());
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(configuration_error(format!(
            "migration path {} is not a directory",
            dir.display()
        )));
    }

    let mut found: BTreeMap<String, Candidates> = BTreeMap::new();
    let entries = fs::read_dir(&dir).map_err(|e| io_error("discover_migrations", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error("discover_migrations", e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((id, variant)) = classify(file_name) else {
            continue;
        };

        let candidates = found.entry(id).or_default();
        match variant {
            Some(dialect) => {
                candidates.variants.insert(dialect, path);
            }
            None => candidates.generic = Some(path),
        }
    }

    let mut units = Vec::with_capacity(found.len());
    for (id, candidates) in found {
        let path = candidates.pick(dialect).cloned().ok_or_else(|| {
            migration_unit_error(
                repository.as_str(),
                &id,
                configuration_error(format!(
                    "no generic or {} script for this unit",
                    dialect.as_str()
                )),
            )
        })?;

        let sql = fs::read_to_string(&path).map_err(|e| {
            migration_unit_error(repository.as_str(), &id, io_error("read_migration", e))
        })?;
        let checksum = compute_checksum(&sql);
        units.push(MigrationUnit {
            id,
            path,
            sql,
            checksum,
        });
    }

    Ok(units)
}
