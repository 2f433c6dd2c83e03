//! Resource models for the audits and websites routes.
//!
//! Row structs map to the `lighthouse_audits` table; the remaining types are
//! what the HTTP layer serializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Database Models (sqlx::FromRow)
// ============================================================================

/// A Lighthouse audit run as stored in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub url: String,
    pub time_created: DateTime<Utc>,
    pub time_completed: Option<DateTime<Utc>>,
    /// `report_json IS NOT NULL`; the report itself is only loaded on demand.
    pub has_report: bool,
}

/// Columns selected into [`AuditRow`].
pub const AUDIT_COLUMNS: &str =
    "id, url, time_created, time_completed, report_json IS NOT NULL AS has_report";

/// Aggregate over all audits of one URL.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSummary {
    pub url: String,
    pub audit_count: i64,
    pub last_audited: DateTime<Utc>,
}

// ============================================================================
// Request Models
// ============================================================================

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 25;
pub const MAX_PAGE_LIMIT: i64 = 100;

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// ============================================================================
// Response Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Running,
    Completed,
    Failed,
}

/// An audit as returned by the API. The raw report is served separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: Uuid,
    pub url: String,
    pub status: AuditStatus,
    pub time_created: DateTime<Utc>,
    pub time_completed: Option<DateTime<Utc>>,
}

impl From<AuditRow> for Audit {
    fn from(row: AuditRow) -> Self {
        let status = match (row.time_completed, row.has_report) {
            (None, _) => AuditStatus::Running,
            (Some(_), true) => AuditStatus::Completed,
            (Some(_), false) => AuditStatus::Failed,
        };
        Self {
            id: row.id,
            url: row.url,
            status,
            time_created: row.time_created,
            time_completed: row.time_completed,
        }
    }
}

/// A website with its audits, newest first.
#[derive(Debug, Serialize)]
pub struct Website {
    pub url: String,
    pub audits: Vec<Audit>,
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(completed: bool, report: bool) -> AuditRow {
        AuditRow {
            id: Uuid::new_v4(),
            url: "https://spotify.com".into(),
            time_created: Utc::now(),
            time_completed: completed.then(Utc::now),
            has_report: report,
        }
    }

    #[test]
    fn audit_status_follows_completion_and_report() {
        assert_eq!(Audit::from(row(false, false)).status, AuditStatus::Running);
        assert_eq!(Audit::from(row(true, true)).status, AuditStatus::Completed);
        assert_eq!(Audit::from(row(true, false)).status, AuditStatus::Failed);
    }

    #[test]
    fn audit_serializes_camel_case() {
        let value = serde_json::to_value(Audit::from(row(false, false))).unwrap();
        assert_eq!(value["status"], "RUNNING");
        assert!(value.get("timeCreated").is_some());
        assert!(value["timeCompleted"].is_null());
    }

    #[test]
    fn page_limits_are_clamped() {
        let query = PageQuery::default();
        assert_eq!((query.limit(), query.offset()), (25, 0));

        let query = PageQuery {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!((query.limit(), query.offset()), (100, 0));

        let query = PageQuery {
            limit: Some(0),
            offset: Some(40),
        };
        assert_eq!((query.limit(), query.offset()), (1, 40));
    }

    #[test]
    fn page_holds_any_item_type() {
        let page = Page {
            items: vec![Audit::from(row(true, true))],
            limit: 25,
            offset: 0,
            total: 1,
        };
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["items"][0]["status"], "COMPLETED");
        assert_eq!(value["total"], 1);

        // the type itself places no bound on its items
        let ids: Page<Uuid> = Page {
            items: Vec::new(),
            limit: 1,
            offset: 0,
            total: 0,
        };
        assert!(ids.items.is_empty());
    }
}
