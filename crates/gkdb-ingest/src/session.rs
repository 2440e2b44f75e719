//! Database session abstraction
//!
//! Insert workers open their own session through a [`Connector`], execute
//! one statement per bundle, and shut the session down when done. The
//! Cassandra adapter is compiled with the `cassandra` feature; the dry-run
//! connector is always available and only logs what it would execute.

use crate::error::Result;
use crate::record::FieldValue;
use crate::statement::render_cql;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// An open connection to the wide-column store
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute a statement with positional `?` placeholders
    async fn execute(&self, statement: &str, values: &[FieldValue]) -> Result<()>;

    /// Release the connection
    async fn shutdown(&self) -> Result<()>;
}

/// Opens sessions; shared by every insert worker of a run
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// Counters shared by every dry-run session of one connector
#[derive(Debug, Default)]
pub struct DryRunCounters {
    sessions: AtomicUsize,
    statements: AtomicUsize,
}

impl DryRunCounters {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn statements(&self) -> usize {
        self.statements.load(Ordering::Relaxed)
    }
}

/// Connector whose sessions log statements instead of executing them
#[derive(Debug, Clone, Default)]
pub struct DryRunConnector {
    counters: Arc<DryRunCounters>,
}

impl DryRunConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Arc<DryRunCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl Connector for DryRunConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        self.counters.sessions.fetch_add(1, Ordering::Relaxed);
        info!("Opened dry-run session");
        Ok(Box::new(DryRunSession {
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct DryRunSession {
    counters: Arc<DryRunCounters>,
}

#[async_trait]
impl Session for DryRunSession {
    async fn execute(&self, statement: &str, values: &[FieldValue]) -> Result<()> {
        let rendered = render_cql(statement, values)?;
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
        debug!(values = values.len(), "{}", rendered);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "cassandra")]
pub use cassandra::CassandraConnector;

#[cfg(feature = "cassandra")]
mod cassandra {
    use super::{Connector, Session};
    use crate::config::DatabaseConfig;
    use crate::error::{IngestError, Result};
    use crate::record::FieldValue;
    use crate::statement::render_cql;
    use async_trait::async_trait;
    use scylla::SessionBuilder;
    use tracing::{debug, info};

    /// Opens ScyllaDB/Cassandra sessions bound to the configured keyspace
    #[derive(Debug, Clone)]
    pub struct CassandraConnector {
        config: DatabaseConfig,
    }

    impl CassandraConnector {
        pub fn new(config: DatabaseConfig) -> Self {
            Self { config }
        }
    }

    #[async_trait]
    impl Connector for CassandraConnector {
        async fn connect(&self) -> Result<Box<dyn Session>> {
            let hosts = self.config.hosts();
            let mut builder = SessionBuilder::new().known_nodes(&hosts);
            if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
                builder = builder.user(user.as_str(), password.as_str());
            }

            let session = builder
                .build()
                .await
                .map_err(|e| IngestError::session(format!("connect to {:?}: {}", hosts, e)))?;
            session
                .use_keyspace(self.config.keyspace.as_str(), false)
                .await
                .map_err(|e| {
                    IngestError::session(format!("use keyspace {}: {}", self.config.keyspace, e))
                })?;

            info!(keyspace = %self.config.keyspace, "Connected to {:?}", hosts);
            Ok(Box::new(CassandraSession { session }))
        }
    }

    struct CassandraSession {
        session: scylla::Session,
    }

    #[async_trait]
    impl Session for CassandraSession {
        async fn execute(&self, statement: &str, values: &[FieldValue]) -> Result<()> {
            // Values travel as literals so loosely typed inputs reach the
            // server unchanged, as the type list produced them.
            let cql = render_cql(statement, values)?;
            self.session
                .query_unpaged(cql, ())
                .await
                .map_err(|e| IngestError::session(e.to_string()))?;
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            debug!("Closing session");
            Ok(())
        }
    }
}
