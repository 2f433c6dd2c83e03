//! Application assembly.
//!
//! Startup is strictly sequential: wait for the database, run migrations, then
//! compose routes and middleware. Nothing is returned unless every step
//! succeeded, so no route is reachable before migrations have run.

use std::sync::Arc;

use axum::Router;
use tracing::{debug, info, Instrument, Span};

use crate::config::ServerOptions;
use crate::db::{self, Connection, PgStore, Store};
use crate::error::StartupError;
use crate::middleware;
use crate::routes;

/// Attaches the handlers of one resource group to the shared router.
///
/// Called once per application instance, after migrations have completed.
pub trait RouteBinder<S: Store>: Send + Sync {
    fn bind_routes(&self, router: Router, conn: &Connection<S>) -> Router;
}

/// Register the health probe and every resource group.
pub fn configure_routes<S: Store>(
    conn: &Connection<S>,
    binders: &[Arc<dyn RouteBinder<S>>],
) -> Router {
    debug!(binders = binders.len(), "attaching routes");
    binders.iter().fold(routes::health::router(), |router, binder| {
        binder.bind_routes(router, conn)
    })
}

/// Build the application without binding a listener.
///
/// Startup log lines are emitted inside `log`, and every request span created
/// by the returned router is parented on it.
pub async fn build_app<S: Store>(
    options: &ServerOptions,
    conn: &Connection<S>,
    binders: &[Arc<dyn RouteBinder<S>>],
    log: &Span,
) -> Result<Router, StartupError> {
    async {
        info!("building application");
        conn.store().await_ready().await?;
        conn.store().run_migrations().await?;

        let router = configure_routes(conn, binders);
        Ok::<_, StartupError>(middleware::configure_middleware(router, options, log))
    }
    .instrument(log.clone())
    .await
}

/// Build the application against PostgreSQL with the bundled audit and
/// website routes.
pub async fn get_app(
    options: &ServerOptions,
    provided: Option<Connection<PgStore>>,
    log: &Span,
) -> Result<Router, StartupError> {
    let conn = db::provision(&options.postgres, provided)?;
    build_app(options, &conn, &routes::default_binders(), log).await
}
