// ABOUTME: PostgreSQL implementation of the database capability traits
// ABOUTME: Connection setup plus transaction-scoped replication and object sessions

pub mod objects;
pub mod replication;

pub use objects::PgObjectSession;
pub use replication::{LogicalSlot, PgReplicationSession};

use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, GenericClient};

use crate::error::Result;

/// Connect to PostgreSQL.
///
/// `sslmode` in the connection string decides whether TLS is used. The
/// connection future is driven by a spawned task that logs its error.
pub async fn connect(connection_string: &str) -> Result<Client> {
    let connector = MakeTlsConnector::new(TlsConnector::builder().build()?);
    let (client, connection) = tokio_postgres::connect(connection_string, connector).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

/// The server's version banner.
pub async fn server_version<C: GenericClient>(client: &C) -> Result<String> {
    let row = client.query_one("SELECT version()", &[]).await?;
    Ok(row.try_get(0)?)
}
