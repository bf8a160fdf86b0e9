//! Cross-server player cache with identity merging.
//!
//! Players are server-agnostic; a row is keyed by whichever identifiers are
//! known (uuid, xuid, name). Upserts merge into an existing row when any
//! identifier matches; conflicting markers lower the confidence score and
//! set the conflict flag instead of creating a duplicate row.

use sqlx::Row;

use crate::{error::Result, json, store::SqliteStore, types::PlayerCacheEntry};

/// Confidence assigned when a merge sees contradictory identity markers.
const CONFLICT_CONFIDENCE: f64 = 0.5;

impl SqliteStore {
    /// Insert or merge a sighting of a player.
    pub async fn upsert_player(&self, entry: &PlayerCacheEntry) -> Result<PlayerCacheEntry> {
        let existing = self
            .find_player_row(
                entry.uuid.as_deref(),
                entry.xuid.as_deref(),
                &entry.name,
            )
            .await?;

        match existing {
            None => {
                let sql = format!(
                    "INSERT INTO {} (uuid, xuid, name, display_name, last_server_id, last_seen,
                        identity_confidence, identity_markers, is_premium, device_type,
                        identity_conflict)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.tables.player_cache
                );
                sqlx::query(&sql)
                    .bind(&entry.uuid)
                    .bind(&entry.xuid)
                    .bind(&entry.name)
                    .bind(&entry.display_name)
                    .bind(&entry.last_server_id)
                    .bind(entry.last_seen)
                    .bind(entry.identity_confidence)
                    .bind(json::encode(&entry.identity_markers))
                    .bind(entry.is_premium)
                    .bind(&entry.device_type)
                    .bind(entry.identity_conflict)
                    .execute(&self.pool)
                    .await?;
                Ok(entry.clone())
            },
            Some((row_id, mut merged)) => {
                let mut conflict = merged.identity_conflict;

                // Contradictory hard identifiers mean two different players
                // correlated by softer markers.
                if conflicts(merged.uuid.as_deref(), entry.uuid.as_deref())
                    || conflicts(merged.xuid.as_deref(), entry.xuid.as_deref())
                {
                    conflict = true;
                }
                if let (Some(old_ip), Some(new_ip)) = (
                    merged.identity_markers.ip.as_deref(),
                    entry.identity_markers.ip.as_deref(),
                ) && old_ip != new_ip
                {
                    conflict = true;
                }

                // Fill missing identifiers, take the newer sighting.
                merged.uuid = merged.uuid.or_else(|| entry.uuid.clone());
                merged.xuid = merged.xuid.or_else(|| entry.xuid.clone());
                merged.name = entry.name.clone();
                merged.display_name = entry
                    .display_name
                    .clone()
                    .or(merged.display_name);
                merged.last_server_id = entry.last_server_id.clone();
                merged.last_seen = entry.last_seen;
                merged.is_premium = entry.is_premium.or(merged.is_premium);
                merged.device_type = entry.device_type.clone().or(merged.device_type);
                if entry.identity_markers.ip.is_some() {
                    merged.identity_markers.ip = entry.identity_markers.ip.clone();
                }
                if entry.identity_markers.device.is_some() {
                    merged.identity_markers.device = entry.identity_markers.device.clone();
                }
                merged.identity_markers.first_seen = merged
                    .identity_markers
                    .first_seen
                    .or(entry.identity_markers.first_seen);

                merged.identity_conflict = conflict;
                merged.identity_confidence = if conflict {
                    merged.identity_confidence.min(CONFLICT_CONFIDENCE)
                } else {
                    merged.identity_confidence
                };

                let sql = format!(
                    "UPDATE {} SET uuid = ?, xuid = ?, name = ?, display_name = ?,
                        last_server_id = ?, last_seen = ?, identity_confidence = ?,
                        identity_markers = ?, is_premium = ?, device_type = ?,
                        identity_conflict = ?
                     WHERE id = ?",
                    self.tables.player_cache
                );
                sqlx::query(&sql)
                    .bind(&merged.uuid)
                    .bind(&merged.xuid)
                    .bind(&merged.name)
                    .bind(&merged.display_name)
                    .bind(&merged.last_server_id)
                    .bind(merged.last_seen)
                    .bind(merged.identity_confidence)
                    .bind(json::encode(&merged.identity_markers))
                    .bind(merged.is_premium)
                    .bind(&merged.device_type)
                    .bind(merged.identity_conflict)
                    .bind(row_id)
                    .execute(&self.pool)
                    .await?;
                Ok(merged)
            },
        }
    }

    /// Lookup by any identifier: uuid, xuid, or name.
    pub async fn find_player(&self, identifier: &str) -> Result<Option<PlayerCacheEntry>> {
        let sql = format!(
            "SELECT * FROM {} WHERE uuid = ? OR xuid = ? OR name = ? LIMIT 1",
            self.tables.player_cache
        );
        let row = sqlx::query(&sql)
            .bind(identifier)
            .bind(identifier)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(player_from_row))
    }

    async fn find_player_row(
        &self,
        uuid: Option<&str>,
        xuid: Option<&str>,
        name: &str,
    ) -> Result<Option<(i64, PlayerCacheEntry)>> {
        let sql = format!(
            "SELECT * FROM {}
             WHERE (uuid IS NOT NULL AND uuid = ?)
                OR (xuid IS NOT NULL AND xuid = ?)
                OR name = ?
             LIMIT 1",
            self.tables.player_cache
        );
        let row = sqlx::query(&sql)
            .bind(uuid)
            .bind(xuid)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get("id"), player_from_row(&r))))
    }
}

fn conflicts(old: Option<&str>, new: Option<&str>) -> bool {
    matches!((old, new), (Some(a), Some(b)) if a != b)
}

fn player_from_row(row: &sqlx::sqlite::SqliteRow) -> PlayerCacheEntry {
    PlayerCacheEntry {
        uuid: row.get("uuid"),
        xuid: row.get("xuid"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        last_server_id: row.get("last_server_id"),
        last_seen: row.get("last_seen"),
        identity_confidence: row.get("identity_confidence"),
        identity_markers: json::decode_or_default(
            row.get::<Option<String>, _>("identity_markers").as_deref(),
            "identity_markers",
        ),
        is_premium: row.get("is_premium"),
        device_type: row.get("device_type"),
        identity_conflict: row.get("identity_conflict"),
    }
}
