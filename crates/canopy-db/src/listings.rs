//! Snapshot listing operations for the `snapshots` and `listings` tables.

use crate::error::{DatabaseError, Result};
use crate::runs::{format_timestamp, parse_timestamp};
use canopy_core::{
    CanonicalListing, Category, Confidence, MenuType, RunId, Snapshot, SizeSpec, TargetId,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

/// Provider item ids currently stored for a target.
pub async fn current_ids(conn: &mut SqliteConnection, target_id: &TargetId) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT provider_item_id FROM listings WHERE target_id = ?",
    )
    .bind(target_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Replace a target's snapshot header and listings.
///
/// Run inside a transaction; the caller commits.
pub async fn write_snapshot(
    conn: &mut SqliteConnection,
    target_id: &TargetId,
    run_id: &RunId,
    replaced_at: DateTime<Utc>,
    listings: &[CanonicalListing],
) -> Result<()> {
    sqlx::query("DELETE FROM listings WHERE target_id = ?")
        .bind(target_id.as_str())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO snapshots (target_id, run_id, replaced_at) VALUES (?, ?, ?)
         ON CONFLICT(target_id) DO UPDATE SET run_id = excluded.run_id,
                                              replaced_at = excluded.replaced_at",
    )
    .bind(target_id.as_str())
    .bind(run_id.as_str())
    .bind(format_timestamp(replaced_at))
    .execute(&mut *conn)
    .await?;

    for (position, listing) in listings.iter().enumerate() {
        let position = i64::try_from(position)
            .map_err(|e| DatabaseError::SerializationError(format!("position: {e}")))?;
        let size_spec = listing
            .size_spec
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let raw_payload = serde_json::to_string(&listing.raw_payload)?;

        sqlx::query(
            "INSERT INTO listings (target_id, provider_item_id, position, name, brand, category,
                                   subcategory, price, discount_price, discount_text, description,
                                   size_spec, menu_type, confidence, raw_payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(target_id.as_str())
        .bind(&listing.provider_item_id)
        .bind(position)
        .bind(&listing.name)
        .bind(&listing.brand)
        .bind(listing.category.as_str())
        .bind(&listing.subcategory)
        .bind(listing.price)
        .bind(listing.discount_price)
        .bind(&listing.discount_text)
        .bind(&listing.description)
        .bind(size_spec)
        .bind(listing.menu_type.as_str())
        .bind(listing.confidence.as_str())
        .bind(raw_payload)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Current snapshot for a target, listings in the order they were harvested.
pub async fn load_snapshot(pool: &Pool<Sqlite>, target_id: &TargetId) -> Result<Option<Snapshot>> {
    let Some(header) = sqlx::query("SELECT run_id, replaced_at FROM snapshots WHERE target_id = ?")
        .bind(target_id.as_str())
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let run_id: String = header.try_get("run_id")?;
    let replaced_at: String = header.try_get("replaced_at")?;

    let rows = sqlx::query(
        "SELECT provider_item_id, name, brand, category, subcategory, price, discount_price,
                discount_text, description, size_spec, menu_type, confidence, raw_payload
         FROM listings
         WHERE target_id = ?
         ORDER BY position",
    )
    .bind(target_id.as_str())
    .fetch_all(pool)
    .await?;

    let listings = rows.iter().map(parse_listing).collect::<Result<Vec<_>>>()?;

    Ok(Some(Snapshot {
        target_id: target_id.clone(),
        run_id: RunId::from_stored(run_id),
        replaced_at: parse_timestamp("replaced_at", &replaced_at)?,
        listings,
    }))
}

/// Listing counts per category in a target's snapshot, largest first.
pub async fn category_counts(
    pool: &Pool<Sqlite>,
    target_id: &TargetId,
) -> Result<Vec<(Category, u64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, COUNT(*) AS n FROM listings
         WHERE target_id = ?
         GROUP BY category
         ORDER BY n DESC, category",
    )
    .bind(target_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(category, n)| {
            let category = category.parse::<Category>().map_err(DatabaseError::Decode)?;
            Ok((category, u64::try_from(n).unwrap_or_default()))
        })
        .collect()
}

fn parse_listing(row: &SqliteRow) -> Result<CanonicalListing> {
    let category: String = row.try_get("category")?;
    let category = category.parse::<Category>().map_err(DatabaseError::Decode)?;

    let menu_type: String = row.try_get("menu_type")?;
    let menu_type = menu_type
        .parse::<MenuType>()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let confidence: String = row.try_get("confidence")?;
    let confidence = match confidence.as_str() {
        "heuristic" => Confidence::Heuristic,
        "mapped" => Confidence::Mapped,
        other => return Err(DatabaseError::Decode(format!("unknown confidence '{other}'"))),
    };

    let size_spec: Option<String> = row.try_get("size_spec")?;
    let size_spec = size_spec
        .map(|json| serde_json::from_str::<SizeSpec>(&json))
        .transpose()?;

    let raw_payload: String = row.try_get("raw_payload")?;

    Ok(CanonicalListing {
        provider_item_id: row.try_get("provider_item_id")?,
        name: row.try_get("name")?,
        brand: row.try_get("brand")?,
        category,
        subcategory: row.try_get("subcategory")?,
        price: row.try_get("price")?,
        discount_price: row.try_get("discount_price")?,
        discount_text: row.try_get("discount_text")?,
        description: row.try_get("description")?,
        size_spec,
        menu_type,
        confidence,
        raw_payload: serde_json::from_str(&raw_payload)?,
    })
}
