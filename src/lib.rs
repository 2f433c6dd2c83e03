//! # Lighthouse Audit Service
//!
//! HTTP server shell for storing and browsing Lighthouse audits.
//!
//! Startup runs in a fixed sequence: obtain a database connection, wait until
//! the database is reachable, apply migrations, then compose routes and
//! middleware. Only then is a listener bound.
//!
//! Exposes the application builder and server lifecycle so integration tests
//! and embedding applications can run the service in-process.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use app::{build_app, get_app, RouteBinder};
pub use config::{PostgresConfig, ServerOptions};
pub use db::{Connection, ConnectionLease, PgStore, Store};
pub use error::{ApiError, StartupError};
pub use server::{launch, start_server, ListeningServer};
