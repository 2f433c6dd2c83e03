//! HTTP route modules.
//!
//! - `health`: liveness probe, always mounted
//! - `audits`: Lighthouse audit records
//! - `websites`: audits grouped by URL

pub mod audits;
pub mod health;
pub mod websites;

use std::sync::Arc;

use crate::app::RouteBinder;
use crate::db::PgStore;

/// The resource groups served by the default application.
pub fn default_binders() -> Vec<Arc<dyn RouteBinder<PgStore>>> {
    vec![Arc::new(audits::AuditRoutes), Arc::new(websites::WebsiteRoutes)]
}
