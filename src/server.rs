//! Server lifecycle: bind, serve, and release the connection on close.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument, Span};

use crate::app::{build_app, RouteBinder};
use crate::config::ServerOptions;
use crate::db::{self, Connection, PgStore, Store};
use crate::error::StartupError;
use crate::routes;

/// A bound, running server.
///
/// The server holds a lease on its connection, released once the listener
/// has stopped. That happens after [`close`](Self::close), after
/// [`shutdown`](Self::shutdown), when this value is dropped, or if serving
/// fails on its own.
pub struct ListeningServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListeningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the server to stop accepting connections and drain. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop the server and wait until it has drained and released its
    /// connection lease. Safe to call more than once; later calls return once
    /// the first has finished.
    pub async fn close(&self) {
        self.shutdown();
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "server task failed to complete");
            }
        }
    }
}

/// Build the application and serve it on `options.port`.
///
/// The lease on `conn` is taken before anything else, so a connection closed
/// by another server in the meantime fails with
/// [`StartupError::ConnectionClosed`]. If startup fails later, for instance
/// with [`StartupError::Listen`] when the port cannot be bound, the lease is
/// forfeited and the store is left open.
pub async fn launch<S: Store>(
    options: &ServerOptions,
    conn: Connection<S>,
    binders: &[Arc<dyn RouteBinder<S>>],
    log: Span,
) -> Result<ListeningServer, StartupError> {
    let lease = conn.lease()?;

    let (app, listener, local_addr) = match bind_app(options, &conn, binders, &log).await {
        Ok(bound) => bound,
        Err(e) => {
            lease.forfeit();
            return Err(e);
        }
    };

    let (shutdown, mut stop) = watch::channel(false);
    let lease = lease.close_on_drop();

    let task = tokio::spawn(
        async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // A dropped sender also ends the wait.
                    let _ = stop.wait_for(|stop| *stop).await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
            info!("listener closed");
            lease.release().await;
        }
        .instrument(log),
    );

    Ok(ListeningServer {
        local_addr,
        shutdown,
        task: Mutex::new(Some(task)),
    })
}

async fn bind_app<S: Store>(
    options: &ServerOptions,
    conn: &Connection<S>,
    binders: &[Arc<dyn RouteBinder<S>>],
    log: &Span,
) -> Result<(Router, TcpListener, SocketAddr), StartupError> {
    let app = build_app(options, conn, binders, log).await?;

    let port = options.port;
    async {
        debug!("starting application server");
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| StartupError::Listen { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartupError::Listen { port, source })?;
        info!(%local_addr, "listening on port {}", local_addr.port());
        Ok::<_, StartupError>((app, listener, local_addr))
    }
    .instrument(log.clone())
    .await
}

/// Start the service against PostgreSQL with the bundled routes.
///
/// A provided connection is reused; otherwise one is built from
/// `options.postgres`.
pub async fn start_server(
    options: &ServerOptions,
    provided: Option<Connection<PgStore>>,
    log: Span,
) -> Result<ListeningServer, StartupError> {
    let conn = db::provision(&options.postgres, provided)?;
    launch(options, conn, &routes::default_binders(), log).await
}
