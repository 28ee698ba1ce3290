//! Dialect-aware query builder
//!
//! One builder produces the SQL for both engines. Dialects differ only in
//! parameter placeholders (`?N` vs `$N`), catalog probes and identity
//! sequence handling; everything else is shared.

use super::SqlValue;

/// SQL dialect of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// SQL text plus its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Query {
    fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Accumulates parameters while SQL is being assembled
struct Binder {
    dialect: Dialect,
    params: Vec<SqlValue>,
}

impl Binder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    /// SQL fragment for `value`: a placeholder, or a literal NULL
    ///
    /// NULL is inlined so the server never has to infer a type for an
    /// untyped null parameter.
    fn bind(&mut self, value: SqlValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn finish(self, sql: String) -> Query {
        Query::new(sql, self.params)
    }
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" => Some(Dialect::Postgres),
            _ => None,
        }
    }

    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", index),
            Dialect::Postgres => format!("${}", index),
        }
    }

    /// Double-quoted identifier (both dialects follow the SQL standard here)
    pub fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    pub fn table_exists(&self, table: &str) -> Query {
        let sql = match self {
            Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            Dialect::Postgres => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
        };
        Query::new(sql, vec![SqlValue::from(table)])
    }

    pub fn table_columns(&self, table: &str) -> Query {
        let sql = match self {
            Dialect::Sqlite => "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
            Dialect::Postgres => {
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position"
            }
        };
        Query::new(sql, vec![SqlValue::from(table)])
    }

    pub fn count_rows(&self, table: &str) -> Query {
        Query::new(
            format!("SELECT COUNT(*) FROM {}", self.quote_ident(table)),
            Vec::new(),
        )
    }

    /// Every row of `table`, ordered by `order_by` when given
    pub fn select_all(&self, table: &str, order_by: Option<&str>) -> Query {
        let mut sql = format!("SELECT * FROM {}", self.quote_ident(table));
        if let Some(column) = order_by {
            sql.push_str(&format!(" ORDER BY {}", self.quote_ident(column)));
        }
        Query::new(sql, Vec::new())
    }

    /// `columns` of the rows where `key_column = key`
    pub fn select_where_eq(
        &self,
        table: &str,
        columns: &[&str],
        key_column: &str,
        key: SqlValue,
    ) -> Query {
        let mut binder = Binder::new(*self);
        let projection = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            projection,
            self.quote_ident(table),
            self.quote_ident(key_column),
            binder.bind(key)
        );
        binder.finish(sql)
    }

    /// `columns` of the rows where any of `null_columns` is NULL
    pub fn select_where_any_null(
        &self,
        table: &str,
        columns: &[&str],
        null_columns: &[&str],
        order_by: &str,
    ) -> Query {
        let projection = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = null_columns
            .iter()
            .map(|c| format!("{} IS NULL", self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" OR ");
        Query::new(
            format!(
                "SELECT {} FROM {} WHERE {} ORDER BY {}",
                projection,
                self.quote_ident(table),
                predicate,
                self.quote_ident(order_by)
            ),
            Vec::new(),
        )
    }

    pub fn insert(&self, table: &str, columns: &[String], values: Vec<SqlValue>) -> Query {
        let mut binder = Binder::new(*self);
        let column_list = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let value_list = values
            .into_iter()
            .map(|v| binder.bind(v))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            column_list,
            value_list
        );
        binder.finish(sql)
    }

    pub fn update_where_eq(
        &self,
        table: &str,
        assignments: Vec<(&str, SqlValue)>,
        key_column: &str,
        key: SqlValue,
    ) -> Query {
        let mut binder = Binder::new(*self);
        let set_list = assignments
            .into_iter()
            .map(|(column, value)| format!("{} = {}", self.quote_ident(column), binder.bind(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_ident(table),
            set_list,
            self.quote_ident(key_column),
            binder.bind(key)
        );
        binder.finish(sql)
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    /// Statement re-aligning an identity sequence after explicit-id inserts
    ///
    /// SQLite derives the next rowid from the table contents, so it needs none.
    pub fn sync_identity(&self, table: &str, column: &str) -> Option<String> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Postgres => {
                let quoted_table = self.quote_ident(table).replace('\'', "''");
                Some(format!(
                    "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({}), 1)) FROM {}",
                    quoted_table,
                    column.replace('\'', "''"),
                    self.quote_ident(column),
                    self.quote_ident(table)
                ))
            }
        }
    }
}
