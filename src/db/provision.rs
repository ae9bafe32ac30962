use super::DbConnection;
use crate::error::{LoadError, Result};
use crate::telemetry::{LoadEvent, Telemetry};

/// Ensures the target database exists before any data is read
pub struct Provisioner<'a> {
    telemetry: &'a dyn Telemetry,
}

impl<'a> Provisioner<'a> {
    pub fn new(telemetry: &'a dyn Telemetry) -> Self {
        Self { telemetry }
    }

    /// Create `database` on the server behind `server`
    ///
    /// MySQL and SQL Server skip creation when the database already exists;
    /// PostgreSQL has no such guard and reports an existing database as a
    /// provisioning error.
    pub async fn ensure_database(&self, server: &mut DbConnection, database: &str) -> Result<()> {
        let dialect = server.dialect();
        if database.trim().is_empty() {
            return Err(LoadError::Config("Database name must not be empty".to_string()));
        }

        let statement = dialect.create_database(database);
        let outcome = match statement.bind.as_deref() {
            Some(bind) => server.execute_with_bind(&statement.sql, bind).await,
            None => server.execute(&statement.sql).await,
        };

        match outcome {
            Ok(()) => {
                self.telemetry.record(&LoadEvent::DatabaseReady {
                    dialect,
                    database: database.to_string(),
                    idempotent: statement.idempotent,
                });
                Ok(())
            }
            Err(source) => {
                let err = LoadError::Provision {
                    dialect,
                    database: database.to_string(),
                    source,
                };
                self.telemetry.record(&LoadEvent::ProvisionFailed {
                    dialect,
                    database: database.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
