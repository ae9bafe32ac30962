use std::fmt;

use crate::config::{
    MAX_ROWS_PER_INSERT, MSSQL_MAX_BIND_PARAMS, MYSQL_MAX_BIND_PARAMS, POSTGRES_MAX_BIND_PARAMS,
};
use crate::error::{LoadError, Result};

/// Destination SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    Mssql,
    #[cfg(test)]
    Sqlite,
}

/// Statement that creates the target database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDatabase {
    pub sql: String,
    /// Database name bound as the statement's single parameter, when the
    /// dialect can take it as a value instead of an inline identifier
    pub bind: Option<String>,
    /// Whether re-running the statement against an existing database succeeds
    pub idempotent: bool,
}

impl Dialect {
    /// Parse the `db_type` argument (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "mssql" => Ok(Dialect::Mssql),
            other => Err(LoadError::Config(format!(
                "Unsupported database type: {}. Supported types: mysql, postgresql, mssql",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgresql",
            Dialect::Mssql => "mssql",
            #[cfg(test)]
            Dialect::Sqlite => "sqlite",
        }
    }

    /// URL scheme the driver expects
    pub(crate) fn canonical_scheme(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
            #[cfg(test)]
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Whether a connection-string scheme (driver suffix already removed)
    /// belongs to this dialect
    pub(crate) fn accepts_scheme(&self, scheme: &str) -> bool {
        let scheme = scheme.to_ascii_lowercase();
        match self {
            Dialect::MySql => matches!(scheme.as_str(), "mysql" | "mariadb"),
            Dialect::Postgres => matches!(scheme.as_str(), "postgres" | "postgresql"),
            Dialect::Mssql => matches!(scheme.as_str(), "mssql" | "sqlserver"),
            #[cfg(test)]
            Dialect::Sqlite => scheme == "sqlite",
        }
    }

    /// Quote an identifier, doubling any embedded closing quote character
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Mssql => format!("[{}]", name.replace(']', "]]")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Build the dialect's database creation statement
    pub fn create_database(&self, database: &str) -> CreateDatabase {
        match self {
            Dialect::MySql => CreateDatabase {
                sql: format!(
                    "CREATE DATABASE IF NOT EXISTS {}",
                    self.quote_identifier(database)
                ),
                bind: None,
                idempotent: true,
            },
            Dialect::Postgres => CreateDatabase {
                sql: format!("CREATE DATABASE {}", self.quote_identifier(database)),
                bind: None,
                idempotent: false,
            },
            // CREATE DATABASE takes no parameters, so the name is quoted
            // server-side from the bound value and run through EXEC.
            Dialect::Mssql => CreateDatabase {
                sql: "IF NOT EXISTS (SELECT 1 FROM sys.databases WHERE name = @P1) \
                      BEGIN \
                      DECLARE @stmt NVARCHAR(MAX) = N'CREATE DATABASE ' + QUOTENAME(@P1); \
                      EXEC (@stmt); \
                      END"
                .to_string(),
                bind: Some(database.to_string()),
                idempotent: true,
            },
            #[cfg(test)]
            Dialect::Sqlite => CreateDatabase {
                sql: format!(
                    "ATTACH DATABASE ':memory:' AS {}",
                    self.quote_identifier(database)
                ),
                bind: None,
                idempotent: false,
            },
        }
    }

    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Mssql => format!("@P{}", index),
            _ => "?".to_string(),
        }
    }

    pub fn max_bind_params(&self) -> usize {
        match self {
            Dialect::MySql => MYSQL_MAX_BIND_PARAMS,
            Dialect::Postgres => POSTGRES_MAX_BIND_PARAMS,
            Dialect::Mssql => MSSQL_MAX_BIND_PARAMS,
            #[cfg(test)]
            Dialect::Sqlite => crate::config::SQLITE_MAX_BIND_PARAMS,
        }
    }

    /// Rows per INSERT statement for a table with `column_count` columns
    ///
    /// Always at least one row, so a single very wide row is still attempted
    /// and any parameter-limit error comes from the destination.
    pub fn rows_per_insert(&self, column_count: usize) -> usize {
        let by_params = (self.max_bind_params() - 1) / column_count.max(1);
        by_params.clamp(1, MAX_ROWS_PER_INSERT)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
