//! Website routes. A website is every audit sharing one URL.
//!
//! GET /v1/websites       - List audited URLs, most recently audited first (paged)
//! GET /v1/websites/{url} - One website and its audits; `url` is percent-encoded

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::app::RouteBinder;
use crate::db::{AppDb, Connection, PgStore};
use crate::error::{ApiError, ApiResult};
use crate::models::{Audit, AuditRow, Page, PageQuery, Website, WebsiteSummary, AUDIT_COLUMNS};

/// Binds the website routes.
pub struct WebsiteRoutes;

impl RouteBinder<PgStore> for WebsiteRoutes {
    fn bind_routes(&self, router: Router, conn: &Connection<PgStore>) -> Router {
        router.merge(self::router(conn.pool().clone()))
    }
}

/// Build the websites router.
pub fn router(pool: AppDb) -> Router {
    Router::new()
        .route("/v1/websites", get(list_websites))
        .route("/v1/websites/{url}", get(get_website))
        .with_state(pool)
}

async fn list_websites(
    State(pool): State<AppDb>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<WebsiteSummary>>> {
    let (limit, offset) = (page.limit(), page.offset());

    let items: Vec<WebsiteSummary> = sqlx::query_as(
        r#"
        SELECT url, COUNT(*) AS audit_count, MAX(time_created) AS last_audited
        FROM lighthouse_audits
        GROUP BY url
        ORDER BY last_audited DESC, url
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT url) FROM lighthouse_audits")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page {
        items,
        limit,
        offset,
        total,
    }))
}

async fn get_website(State(pool): State<AppDb>, Path(url): Path<String>) -> ApiResult<Json<Website>> {
    let rows: Vec<AuditRow> = sqlx::query_as(&format!(
        "SELECT {AUDIT_COLUMNS} FROM lighthouse_audits WHERE url = $1 ORDER BY time_created DESC"
    ))
    .bind(&url)
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        return Err(ApiError::not_found(format!("no audits found for {url}")));
    }

    Ok(Json(Website {
        url,
        audits: rows.into_iter().map(Audit::from).collect(),
    }))
}
