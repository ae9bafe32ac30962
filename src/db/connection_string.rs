use url::Url;

use super::Dialect;
use crate::error::{LoadError, Result};

/// Server-level connection string, validated against the selected dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl {
    dialect: Dialect,
    url: Url,
}

impl ServerUrl {
    /// Parse a server-level connection string such as `mysql://user:pw@host:3306`
    ///
    /// A driver suffix on the scheme (`postgresql+psycopg2://`) is dropped and
    /// the scheme is replaced with the one the driver expects. The URL must
    /// not name a database; that is derived with [`ServerUrl::database_url`].
    pub fn parse(dialect: Dialect, connection_string: &str) -> Result<Self> {
        let (scheme, rest) = connection_string.trim().split_once("://").ok_or_else(|| {
            LoadError::Config(format!(
                "Connection string must look like {}://user:password@host:port",
                dialect.canonical_scheme()
            ))
        })?;

        let base_scheme = scheme.split('+').next().unwrap_or(scheme);
        if !dialect.accepts_scheme(base_scheme) {
            return Err(LoadError::Config(format!(
                "Connection string scheme '{}' does not match database type '{}'",
                scheme, dialect
            )));
        }

        let url = Url::parse(&format!("{}://{}", dialect.canonical_scheme(), rest))
            .map_err(|e| LoadError::Config(format!("Invalid connection string: {}", e)))?;

        if url.host_str().is_none_or(str::is_empty) {
            return Err(LoadError::Config(
                "Connection string is missing a host".to_string(),
            ));
        }

        let path = url.path().trim_matches('/');
        if !path.is_empty() {
            return Err(LoadError::Config(format!(
                "Connection string must point at the server, not database '{}'",
                path
            )));
        }

        Ok(Self { dialect, url })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connection URL scoped to `database`, i.e. the server URL with `/<database>` appended
    pub fn database_url(&self, database: &str) -> Url {
        let mut url = self.url.clone();
        url.set_path(&format!("/{}", urlencoding::encode(database)));
        url
    }

    /// `host:port` for log messages, without credentials
    pub fn display_target(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }
}
