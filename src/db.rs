//! Database connection handling.
//!
//! The bootstrap sequence only needs three things from the database: wait
//! until it is reachable, bring the schema up to date, and release it once the
//! last server using it has stopped. Those are captured by [`Store`] so the
//! startup path can run against an in-memory stand-in in tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::PostgresConfig;
use crate::error::StartupError;

/// Type alias for the application database pool.
pub type AppDb = PgPool;

/// Lifecycle operations the server performs on its backing store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Block until the store accepts queries or the retry policy is exhausted.
    async fn await_ready(&self) -> Result<(), StartupError>;

    /// Apply pending migrations. Must be safe to call on an up-to-date schema.
    async fn run_migrations(&self) -> Result<(), StartupError>;

    /// Release the underlying resources.
    async fn close(&self);
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: AppDb,
    connect_attempts: u32,
    retry_delay: Duration,
}

impl PgStore {
    pub fn new(pool: AppDb, connect_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            pool,
            connect_attempts: connect_attempts.max(1),
            retry_delay,
        }
    }

    /// Wrap an existing pool using the default readiness policy.
    pub fn from_pool(pool: AppDb) -> Self {
        let defaults = PostgresConfig::default();
        Self::new(pool, defaults.connect_attempts, defaults.retry_delay())
    }

    pub fn pool(&self) -> &AppDb {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn await_ready(&self) -> Result<(), StartupError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(&self.pool)
                .await
            {
                Ok(_) => {
                    debug!(attempt, "database reachable");
                    return Ok(());
                }
                Err(e) if attempt >= self.connect_attempts => {
                    return Err(StartupError::Connection {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.connect_attempts,
                        error = %e,
                        "database not reachable yet, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn run_migrations(&self) -> Result<(), StartupError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations complete");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}

/// Shared handle to a store.
///
/// Clones refer to the same store. Running servers hold a [`ConnectionLease`];
/// the store is closed when the last outstanding lease is released, after
/// which no new lease is granted. A connection that was never leased is never
/// closed by this crate.
pub struct Connection<S> {
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    store: S,
    leases: Mutex<LeaseState>,
}

#[derive(Default)]
struct LeaseState {
    active: usize,
    closed: bool,
}

impl<S> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Store> Connection<S> {
    pub fn new(store: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                leases: Mutex::new(LeaseState::default()),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Number of leases not yet given back.
    pub fn active_leases(&self) -> usize {
        self.lease_state().active
    }

    /// Whether the last lease has been released and the store closed.
    pub fn is_closed(&self) -> bool {
        self.lease_state().closed
    }

    /// Claim the connection for one server.
    ///
    /// Fails with [`StartupError::ConnectionClosed`] once the store has been
    /// closed by the release of its last lease.
    pub fn lease(&self) -> Result<ConnectionLease<S>, StartupError> {
        let mut state = self.lease_state();
        if state.closed {
            return Err(StartupError::ConnectionClosed);
        }
        state.active += 1;
        Ok(ConnectionLease {
            conn: Some(self.clone()),
            close_on_drop: false,
        })
    }

    fn lease_state(&self) -> MutexGuard<'_, LeaseState> {
        self.shared
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop one lease. Returns true when the caller must close the store.
    fn end_lease(&self, close_if_last: bool) -> bool {
        let mut state = self.lease_state();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && close_if_last && !state.closed {
            state.closed = true;
            true
        } else {
            false
        }
    }

    async fn give_back(&self) -> bool {
        if self.end_lease(true) {
            self.store().close().await;
            true
        } else {
            debug!(
                remaining = self.active_leases(),
                "connection still leased, leaving it open"
            );
            false
        }
    }
}

impl Connection<PgStore> {
    pub fn pool(&self) -> &AppDb {
        self.store().pool()
    }
}

impl From<AppDb> for Connection<PgStore> {
    fn from(pool: AppDb) -> Self {
        Connection::new(PgStore::from_pool(pool))
    }
}

/// A claim on a [`Connection`] held for the lifetime of one server.
///
/// A lease is given back exactly once: by [`release`](Self::release), by
/// [`forfeit`](Self::forfeit), or on drop. A fresh lease is forfeited when
/// dropped; after [`close_on_drop`](Self::close_on_drop) dropping it behaves
/// like `release`, with the close running on a spawned task.
pub struct ConnectionLease<S: Store> {
    conn: Option<Connection<S>>,
    close_on_drop: bool,
}

impl<S: Store> ConnectionLease<S> {
    /// Make an unreleased drop give the lease back as if released, so a
    /// holder that dies without releasing still closes the last lease.
    pub fn close_on_drop(mut self) -> Self {
        self.close_on_drop = true;
        self
    }

    /// Give the lease back, closing the store if it was the last one.
    ///
    /// Returns whether the store was closed.
    pub async fn release(mut self) -> bool {
        match self.conn.take() {
            Some(conn) => conn.give_back().await,
            None => false,
        }
    }

    /// Give the lease back without ever closing the store. Used when the
    /// server holding it failed to start.
    pub fn forfeit(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.end_lease(false);
        }
    }
}

impl<S: Store> Drop for ConnectionLease<S> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !self.close_on_drop {
            conn.end_lease(false);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("connection lease dropped without release, releasing in background");
                runtime.spawn(async move {
                    conn.give_back().await;
                });
            }
            Err(_) => {
                warn!("connection lease dropped outside a runtime, store left open");
                conn.end_lease(false);
            }
        }
    }
}

/// Obtain the connection the server will use.
///
/// A provided connection is reused as-is. Otherwise a pool is constructed from
/// `config` without opening any connection yet; the readiness gate does that.
pub fn provision(
    config: &PostgresConfig,
    provided: Option<Connection<PgStore>>,
) -> Result<Connection<PgStore>, StartupError> {
    if let Some(conn) = provided {
        debug!("using provided database connection");
        return Ok(conn);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy_with(config.connect_options()?);

    Ok(Connection::new(PgStore::new(
        pool,
        config.connect_attempts,
        config.retry_delay(),
    )))
}
