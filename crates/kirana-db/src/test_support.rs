//! Shared fixtures for the repository tests.

use std::ops::Deref;

use kirana_core::{CheckoutPolicy, Money, Product};
use tempfile::TempDir;

use crate::pool::{Database, DbConfig};
use crate::repository::product::NewProduct;

pub(crate) async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub(crate) async fn memory_db_with(policy: CheckoutPolicy) -> Database {
    Database::new(DbConfig::in_memory().checkout_policy(policy))
        .await
        .unwrap()
}

/// A file-backed database in its own temp directory. The directory, with
/// the WAL and SHM files, is removed when this is dropped.
pub(crate) struct FileDb {
    db: Database,
    _dir: TempDir,
}

impl Deref for FileDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// A file-backed database with several connections, for tests where
/// writers must really race.
pub(crate) async fn file_db() -> FileDb {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("kirana.db")).max_connections(8))
        .await
        .unwrap();
    FileDb { db, _dir: dir }
}

pub(crate) async fn product(db: &Database, name: &str, rupees: i64, stock: i64) -> Product {
    db.products()
        .insert_product(&NewProduct::new("store-1", name, Money::from_rupees(rupees), stock))
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_db_removes_its_files() {
        let db = file_db().await;
        let dir = db._dir.path().to_path_buf();
        product(&db, "Parle-G 250g", 25, 10).await;
        assert!(dir.join("kirana.db").exists());

        db.close().await;
        drop(db);
        assert!(!dir.exists());
    }
}
