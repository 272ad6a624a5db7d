//! Database connection and initialization.

pub use badgetrack_core::db::DatabaseError;

badgetrack_core::define_database!(Database, "Tag database migrations complete");

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = Database::open_in_memory().await;
        assert!(db.is_ok());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn open_on_disk_runs_migrations_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tags.db");
        drop(Database::open(&path).await.unwrap());
        let db = Database::open(&path).await.unwrap();
        assert_eq!(db.count_tags().await.unwrap(), 0);
    }
}
