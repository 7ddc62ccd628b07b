//! Run header operations for the `scrape_runs` table.

use crate::error::{DatabaseError, Result};
use canopy_core::{FailureCause, RunId, RunStatus, ScrapeRun, StrategyId, TargetId};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

/// Timestamps are stored with fixed precision so they sort as text.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid {column} '{value}': {e}")))
}

/// Insert a run header.
///
/// # Errors
/// Returns `DatabaseError` if the failure cause cannot be serialized or the
/// insert fails (including a duplicate run id).
pub async fn insert_run(conn: &mut SqliteConnection, run: &ScrapeRun) -> Result<()> {
    let failure = run.failure().map(serde_json::to_string).transpose()?;
    let listing_count = i64::try_from(run.listing_count())
        .map_err(|e| DatabaseError::SerializationError(format!("listing count: {e}")))?;

    sqlx::query(
        "INSERT INTO scrape_runs (id, target_id, started_at, finished_at, status,
                                  listing_count, winning_strategy, failure)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(run.id().as_str())
    .bind(run.target_id().as_str())
    .bind(format_timestamp(run.started_at()))
    .bind(format_timestamp(run.finished_at()))
    .bind(run.status().as_str())
    .bind(listing_count)
    .bind(run.winning_strategy().map(|s| s.as_str()))
    .bind(failure)
    .execute(conn)
    .await?;

    Ok(())
}

/// Run headers for a target, most recent first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a row cannot be decoded.
pub async fn list_for_target(pool: &Pool<Sqlite>, target_id: &TargetId) -> Result<Vec<ScrapeRun>> {
    let rows = sqlx::query(
        "SELECT id, target_id, started_at, finished_at, status,
                listing_count, winning_strategy, failure
         FROM scrape_runs
         WHERE target_id = ?
         ORDER BY finished_at DESC, rowid DESC",
    )
    .bind(target_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_run).collect()
}

/// Most recent run header for a target.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or the row cannot be decoded.
pub async fn latest_for_target(
    pool: &Pool<Sqlite>,
    target_id: &TargetId,
) -> Result<Option<ScrapeRun>> {
    let row = sqlx::query(
        "SELECT id, target_id, started_at, finished_at, status,
                listing_count, winning_strategy, failure
         FROM scrape_runs
         WHERE target_id = ?
         ORDER BY finished_at DESC, rowid DESC
         LIMIT 1",
    )
    .bind(target_id.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(parse_run).transpose()
}

fn parse_run(row: &SqliteRow) -> Result<ScrapeRun> {
    let target_id: String = row.try_get("target_id")?;
    let target_id =
        TargetId::new(target_id).map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let started_at: String = row.try_get("started_at")?;
    let finished_at: String = row.try_get("finished_at")?;

    let status: String = row.try_get("status")?;
    let status: RunStatus = status.parse().map_err(DatabaseError::Decode)?;

    let listing_count: i64 = row.try_get("listing_count")?;
    let listing_count = usize::try_from(listing_count)
        .map_err(|e| DatabaseError::Decode(format!("invalid listing_count: {e}")))?;

    let winning_strategy: Option<String> = row.try_get("winning_strategy")?;
    let winning_strategy = winning_strategy
        .map(|s| s.parse::<StrategyId>())
        .transpose()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let failure: Option<String> = row.try_get("failure")?;
    let failure = failure
        .map(|json| serde_json::from_str::<FailureCause>(&json))
        .transpose()?;

    Ok(ScrapeRun::restore(
        RunId::from_stored(row.try_get::<String, _>("id")?),
        target_id,
        parse_timestamp("started_at", &started_at)?,
        parse_timestamp("finished_at", &finished_at)?,
        status,
        listing_count,
        winning_strategy,
        failure,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use canopy_core::RunHandle;

    fn target() -> TargetId {
        TargetId::new("north-side").unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list_runs() {
        let db = Database::in_memory().await.expect("open database");
        let first = RunHandle::start(target()).succeed(12, StrategyId::PaginatedRest);
        let second = RunHandle::start(target()).fail(FailureCause::BlockedOrChallenged {
            reason: "captcha".to_string(),
        });

        let mut conn = db.pool().acquire().await.expect("acquire connection");
        insert_run(&mut conn, &first).await.expect("insert first");
        insert_run(&mut conn, &second).await.expect("insert second");
        drop(conn);

        let runs = list_for_target(db.pool(), &target()).await.expect("list runs");
        let ids: Vec<&RunId> = runs.iter().map(ScrapeRun::id).collect();
        assert_eq!(ids, vec![second.id(), first.id()]);
        assert_eq!(runs[1].listing_count(), 12);
        assert_eq!(runs[1].winning_strategy(), Some(StrategyId::PaginatedRest));
        assert_eq!(runs[0].failure(), second.failure());

        let latest = latest_for_target(db.pool(), &target())
            .await
            .expect("latest run")
            .expect("a run");
        assert_eq!(latest.id(), second.id());
        assert_eq!(latest.status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_run_id_rejected() {
        let db = Database::in_memory().await.expect("open database");
        let run = RunHandle::start(target()).fail(FailureCause::EmptyNoData);

        let mut conn = db.pool().acquire().await.expect("acquire connection");
        insert_run(&mut conn, &run).await.expect("insert");
        assert!(matches!(
            insert_run(&mut conn, &run).await,
            Err(DatabaseError::Sqlx(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_is_decode_error() {
        let db = Database::in_memory().await.expect("open database");
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(db.pool())
            .await
            .expect("disable checks");
        sqlx::query(
            "INSERT INTO scrape_runs (id, target_id, started_at, finished_at, status)
             VALUES ('r1', 'north-side', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:01:00.000000Z', 'paused')",
        )
        .execute(db.pool())
        .await
        .expect("insert raw row");

        let result = list_for_target(db.pool(), &target()).await;
        assert!(matches!(result, Err(DatabaseError::Decode(_))));
    }
}
