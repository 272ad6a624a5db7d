//! Tag queries for the badgetrack daemon.

use badgetrack_core::{TagMetadata, TagRecord, TagStore};

use super::db::{Database, DatabaseError};

impl Database {
    /// Record a detection: create the tag if unseen, otherwise refresh it.
    ///
    /// `last_seen` only moves forward and `first_seen` only moves back, so
    /// out-of-order writes for the same tag converge on the same row. Empty
    /// metadata never overwrites values reported earlier.
    pub async fn upsert_detection(
        &self,
        tag_id: &str,
        observed_at: i64,
        metadata: &TagMetadata,
    ) -> Result<TagRecord, DatabaseError> {
        let record = sqlx::query_as::<_, TagRecord>(
            r"
            INSERT INTO tags (tag_id, tag_type, size, first_seen, last_seen, detection_count)
            VALUES (?, ?, ?, ?, ?, 1)
            ON CONFLICT(tag_id) DO UPDATE SET
                first_seen = MIN(tags.first_seen, excluded.first_seen),
                last_seen = MAX(tags.last_seen, excluded.last_seen),
                detection_count = tags.detection_count + 1,
                tag_type = CASE WHEN excluded.tag_type <> '' THEN excluded.tag_type ELSE tags.tag_type END,
                size = CASE WHEN excluded.size <> 0 THEN excluded.size ELSE tags.size END
            RETURNING *
            ",
        )
        .bind(tag_id)
        .bind(metadata.tag_type.as_str())
        .bind(metadata.size)
        .bind(observed_at)
        .bind(observed_at)
        .fetch_one(self.pool())
        .await?;

        Ok(record)
    }

    /// Look up a tag by its identifier.
    pub async fn find_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, TagRecord>("SELECT * FROM tags WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(record)
    }

    /// List all tags, most recently seen first.
    pub async fn list_tags(&self) -> Result<Vec<TagRecord>, DatabaseError> {
        let records =
            sqlx::query_as::<_, TagRecord>("SELECT * FROM tags ORDER BY last_seen DESC, id ASC")
                .fetch_all(self.pool())
                .await?;
        Ok(records)
    }

    /// Number of distinct tags ever seen.
    pub async fn count_tags(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

impl TagStore for Database {
    async fn upsert_detection(
        &self,
        tag_id: &str,
        observed_at: i64,
        metadata: &TagMetadata,
    ) -> Result<TagRecord, DatabaseError> {
        Self::upsert_detection(self, tag_id, observed_at, metadata).await
    }

    async fn lookup_by_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, DatabaseError> {
        self.find_tag(tag_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta(tag_type: &str, size: i64) -> TagMetadata {
        TagMetadata {
            tag_type: tag_type.into(),
            size,
        }
    }

    #[tokio::test]
    async fn first_detection_creates_tag() {
        let db = Database::open_in_memory().await.unwrap();
        let record = db
            .upsert_detection("04A1B2C3", 100, &meta("MIFARE 1K", 1024))
            .await
            .unwrap();

        assert_eq!(record.tag_id, "04A1B2C3");
        assert_eq!(record.tag_type, "MIFARE 1K");
        assert_eq!(record.size, 1024);
        assert_eq!(record.first_seen, 100);
        assert_eq!(record.last_seen, 100);
        assert_eq!(record.detection_count, 1);
    }

    #[tokio::test]
    async fn repeat_detection_refreshes_last_seen() {
        let db = Database::open_in_memory().await.unwrap();
        let first = db.upsert_detection("A", 100, &meta("MIFARE", 1024)).await.unwrap();
        let second = db.upsert_detection("A", 250, &TagMetadata::default()).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.first_seen, 100);
        assert_eq!(second.last_seen, 250);
        assert_eq!(second.detection_count, 2);
        assert_eq!(second.tag_type, "MIFARE");
        assert_eq!(second.size, 1024);
        assert_eq!(db.count_tags().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_detection_does_not_rewind_last_seen() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_detection("A", 300, &TagMetadata::default()).await.unwrap();
        let record = db.upsert_detection("A", 200, &TagMetadata::default()).await.unwrap();

        assert_eq!(record.last_seen, 300);
        assert_eq!(record.first_seen, 200);
    }

    #[tokio::test]
    async fn lookup_by_tag_through_trait() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(TagStore::lookup_by_tag(&db, "A").await.unwrap().is_none());

        TagStore::upsert_detection(&db, "A", 1, &TagMetadata::default())
            .await
            .unwrap();
        let found = TagStore::lookup_by_tag(&db, "A").await.unwrap().unwrap();
        assert_eq!(found.tag_id, "A");
    }

    #[tokio::test]
    async fn find_missing_tag_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.find_tag("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_tags_orders_by_recency() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_detection("old", 10, &TagMetadata::default()).await.unwrap();
        db.upsert_detection("new", 20, &TagMetadata::default()).await.unwrap();

        let ids: Vec<String> = db
            .list_tags()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.tag_id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }
}
