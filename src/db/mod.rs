//! Database layer - dialects, connections, provisioning and table schemas

pub mod connection;
pub mod connection_string;
pub mod dialect;
pub mod provision;
pub mod schema;

pub use connection::DbConnection;
pub use connection_string::ServerUrl;
pub use dialect::Dialect;
pub use provision::Provisioner;
pub use schema::TableSchema;
