//! Lighthouse audit routes.
//!
//! GET    /v1/audits         - List audits, newest first (paged)
//! GET    /v1/audits/{id}     - Retrieve an audit
//! GET    /v1/audits/{id}/lhr - Raw Lighthouse result of a completed audit
//! DELETE /v1/audits/{id}     - Delete an audit and return it

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::app::RouteBinder;
use crate::db::{AppDb, Connection, PgStore};
use crate::error::{ApiError, ApiResult};
use crate::models::{Audit, AuditRow, Page, PageQuery, AUDIT_COLUMNS};

/// Binds the audit routes.
pub struct AuditRoutes;

impl RouteBinder<PgStore> for AuditRoutes {
    fn bind_routes(&self, router: Router, conn: &Connection<PgStore>) -> Router {
        router.merge(self::router(conn.pool().clone()))
    }
}

/// Build the audits router.
pub fn router(pool: AppDb) -> Router {
    Router::new()
        .route("/v1/audits", get(list_audits))
        .route("/v1/audits/{id}", get(get_audit).delete(delete_audit))
        .route("/v1/audits/{id}/lhr", get(get_audit_report))
        .with_state(pool)
}

async fn list_audits(
    State(pool): State<AppDb>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Audit>>> {
    let (limit, offset) = (page.limit(), page.offset());

    let rows: Vec<AuditRow> = sqlx::query_as(&format!(
        "SELECT {AUDIT_COLUMNS} FROM lighthouse_audits ORDER BY time_created DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lighthouse_audits")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page {
        items: rows.into_iter().map(Audit::from).collect(),
        limit,
        offset,
        total,
    }))
}

async fn get_audit(State(pool): State<AppDb>, Path(id): Path<Uuid>) -> ApiResult<Json<Audit>> {
    let row: AuditRow = sqlx::query_as(&format!(
        "SELECT {AUDIT_COLUMNS} FROM lighthouse_audits WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| audit_not_found(id))?;

    Ok(Json(row.into()))
}

async fn get_audit_report(
    State(pool): State<AppDb>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let report: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT report_json FROM lighthouse_audits WHERE id = $1")
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| audit_not_found(id))?;

    report.map(Json).ok_or_else(|| {
        ApiError::bad_request(format!("audit {id} has no report; it is still running or failed"))
    })
}

async fn delete_audit(State(pool): State<AppDb>, Path(id): Path<Uuid>) -> ApiResult<Json<Audit>> {
    let row: AuditRow = sqlx::query_as(&format!(
        "DELETE FROM lighthouse_audits WHERE id = $1 RETURNING {AUDIT_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| audit_not_found(id))?;

    info!(audit_id = %id, url = %row.url, "audit deleted");
    Ok(Json(row.into()))
}

fn audit_not_found(id: Uuid) -> ApiError {
    ApiError::not_found(format!("audit {id} not found"))
}
