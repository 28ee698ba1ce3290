use thiserror::Error;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code. The first five kinds are the boot
/// taxonomy; the rest classify driver and filesystem failures underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    /// Unsupported or incomplete deployment profile
    Configuration,
    /// A store could not be reached or opened
    Connection,
    /// A schema migration unit failed
    MigrationUnit,
    /// An expected table or row was absent in a benign way
    RepairPrecondition,
    /// A row could not be safely copied or rewritten
    DataIntegrity,

    // Integration/IO
    Io,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::Connection => "ERR_CONNECTION",
            ExErrorKind::MigrationUnit => "ERR_MIGRATION_UNIT",
            ExErrorKind::RepairPrecondition => "ERR_REPAIR_PRECONDITION",
            ExErrorKind::DataIntegrity => "ERR_DATA_INTEGRITY",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification plus the boot context (repository, migration
/// unit, table) needed to make a startup failure identifiable from the log
/// line alone.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    repository: Option<String>,
    unit: Option<String>,
    table: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            repository: None,
            unit: None,
            table: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add repository context
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Add migration unit (or repair procedure) context
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(repository) = &self.repository {
            write!(f, " (repository: {})", repository)?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " (unit: {})", unit)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Boot-time error taxonomy
///
/// Call sites raise these descriptive variants; they are converted into the
/// canonical [`ExError`] at the boundary of the store crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Could not open store {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("Migration unit {unit} of repository {repository} failed: {reason}")]
    MigrationUnit {
        repository: String,
        unit: String,
        reason: String,
    },

    #[error("Repair {procedure}: table {table} not present")]
    RepairPrecondition { procedure: String, table: String },

    #[error("Repair {procedure}: cannot process {table}{}: {reason}", row_suffix(.row))]
    DataIntegrity {
        procedure: String,
        table: String,
        row: Option<String>,
        reason: String,
    },
}

fn row_suffix(row: &Option<String>) -> String {
    row.as_ref().map(|r| format!(" row {}", r)).unwrap_or_default()
}

impl From<StoreError> for ExError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Configuration { .. } => ExError::new(ExErrorKind::Configuration)
                .with_op("resolve_store_target")
                .with_message(message),

            StoreError::Connection { .. } => ExError::new(ExErrorKind::Connection)
                .with_op("acquire_connection")
                .with_message(message),

            StoreError::MigrationUnit {
                repository, unit, ..
            } => ExError::new(ExErrorKind::MigrationUnit)
                .with_op("apply_migration_unit")
                .with_repository(repository)
                .with_unit(unit)
                .with_message(message),

            StoreError::RepairPrecondition { procedure, table } => {
                ExError::new(ExErrorKind::RepairPrecondition)
                    .with_op("repair")
                    .with_unit(procedure)
                    .with_table(table)
                    .with_message(message)
            }

            StoreError::DataIntegrity {
                procedure, table, ..
            } => ExError::new(ExErrorKind::DataIntegrity)
                .with_op("repair")
                .with_unit(procedure)
                .with_table(table)
                .with_message(message),
        }
    }
}
