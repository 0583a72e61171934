//! Main entry point.
//!
//! `Tessera` wires the layers together from one [`TesseraConfig`]:
//! database, metadata cache, access controller, RLS rewriter, mutation
//! engine and outbox.

use std::sync::Arc;
use std::time::Duration;

use tessera_access::{AccessController, AccessDirectory, InMemoryDirectory};
use tessera_config::{QueryDialect, TesseraConfig};
use tessera_metadata::{Catalog, FileCatalog, MetadataCache, MetadataSource, StaticCatalog};
use tessera_query::{RowLevelSecurity, SqlDialect, SqlparserFrontend};
use tessera_store::outbox::Subscriber;
use tessera_store::{
    Database, DatabaseOptions, EngineOptions, Outbox, OutboxOptions, OutboxWorker, RecordEngine,
};
use tessera_types::RequestContext;
use tracing::info;

use crate::error::Result;

/// A Tessera record store.
///
/// Cloning is not supported; share it behind an `Arc`. The handle owns no
/// background threads: the outbox worker is started explicitly with
/// [`Tessera::start_outbox_worker`] and stops when dropped.
pub struct Tessera {
    config: TesseraConfig,
    db: Arc<Database>,
    metadata: Arc<MetadataCache>,
    access: Arc<AccessController>,
    rls: RowLevelSecurity,
    engine: RecordEngine,
    outbox: Arc<Outbox>,
}

impl Tessera {
    /// Opens a store from configuration.
    ///
    /// The catalog comes from `metadata.catalog_path` when set and is empty
    /// otherwise. Grants start empty: only the super-user profile can do
    /// anything until the directory is populated, so most callers use
    /// [`Tessera::open_with`].
    pub fn open(config: TesseraConfig) -> Result<Self> {
        let source: Arc<dyn MetadataSource> = match &config.metadata.catalog_path {
            Some(path) => Arc::new(FileCatalog::new(path)),
            None => Arc::new(StaticCatalog::new(Catalog::new())),
        };
        Self::open_with(config, source, Arc::new(InMemoryDirectory::new()))
    }

    /// Opens a store with a caller-supplied catalog and grant directory.
    pub fn open_with(
        config: TesseraConfig,
        source: Arc<dyn MetadataSource>,
        directory: Arc<dyn AccessDirectory>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::open_with(
            &config.database.path,
            DatabaseOptions {
                busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
                max_idle_connections: config.database.max_idle_connections,
            },
        )?);
        db.bootstrap()?;

        let metadata = Arc::new(MetadataCache::new(source));
        metadata.init()?;

        let mut access = AccessController::new(Arc::clone(&metadata), directory)
            .with_super_user_profile(config.access.super_user_profile.clone());
        if !config.access.audit {
            access = access.without_audit();
        }
        let access = Arc::new(access);

        let rls = RowLevelSecurity::new(Arc::clone(&access))
            .with_frontend(SqlparserFrontend::new(dialect(config.query.dialect)))
            .reject_unresolved_sources(config.query.reject_unresolved_sources);

        let engine = RecordEngine::new(Arc::clone(&db), Arc::clone(&metadata), Arc::clone(&access))
            .with_options(EngineOptions {
                system_user_name: config.access.system_user_name.clone(),
                bulk_batch_size: config.bulk.batch_size,
            });

        let outbox = Arc::new(Outbox::new(
            Arc::clone(&db),
            OutboxOptions {
                batch_size: config.outbox.batch_size,
                max_attempts: config.outbox.max_attempts,
                claim_lease: Duration::from_secs(config.outbox.claim_lease_secs),
            },
        ));

        let tessera = Self {
            config,
            db,
            metadata,
            access,
            rls,
            engine,
            outbox,
        };
        let tables = tessera.ensure_tables()?;
        info!(path = %tessera.db.path().display(), tables, "Tessera opened");
        Ok(tessera)
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn engine(&self) -> &RecordEngine {
        &self.engine
    }

    pub fn access(&self) -> &Arc<AccessController> {
        &self.access
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn rls(&self) -> &RowLevelSecurity {
        &self.rls
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Creates a table for every object in the catalog that lacks one.
    /// Returns the number of objects.
    pub fn ensure_tables(&self) -> Result<usize> {
        let schemas = self.metadata.all_schemas()?;
        for schema in &schemas {
            self.db.ensure_object_table(schema)?;
        }
        Ok(schemas.len())
    }

    /// Reloads the catalog and role hierarchy, then creates tables for any
    /// new objects.
    pub fn reload_metadata(&self) -> Result<()> {
        self.metadata.invalidate()?;
        self.metadata.init()?;
        self.access.invalidate_roles();
        self.ensure_tables()?;
        Ok(())
    }

    /// Validates an ad-hoc read query for the request's actor and returns
    /// the text to execute.
    pub fn rewrite_query(&self, ctx: &RequestContext, sql: &str) -> Result<String> {
        ctx.check_cancelled().map_err(tessera_store::RecordError::from)?;
        Ok(self.rls.rewrite(sql, ctx.actor())?)
    }

    /// Starts delivering committed events to `subscriber` on the
    /// configured poll interval.
    pub fn start_outbox_worker(&self, subscriber: Arc<dyn Subscriber>) -> Result<OutboxWorker> {
        Ok(OutboxWorker::start(
            Arc::clone(&self.outbox),
            subscriber,
            Duration::from_millis(self.config.outbox.poll_interval_ms),
        )?)
    }

    /// Removes delivered events older than the configured retention.
    pub fn cleanup_outbox(&self) -> Result<usize> {
        let retention = Duration::from_secs(self.config.outbox.retention_hours * 3600);
        Ok(self.outbox.cleanup_processed(retention)?)
    }
}

impl std::fmt::Debug for Tessera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tessera")
            .field("db", &self.db)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn dialect(dialect: QueryDialect) -> SqlDialect {
    match dialect {
        QueryDialect::Generic => SqlDialect::Generic,
        QueryDialect::Sqlite => SqlDialect::Sqlite,
        QueryDialect::Postgres => SqlDialect::Postgres,
    }
}
