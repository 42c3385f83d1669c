//! Storage integration tests
//!
//! **Requirements**:
//! - MinIO or S3 must be running and accessible, with the bucket created
//! - S3_ENDPOINT environment variable must be set (e.g., "http://localhost:9000")
//! - Tests will be skipped if S3_ENDPOINT is not configured
//!
//! **Running tests**:
//! ```bash
//! # With MinIO running via docker-compose
//! cargo test --test storage_tests
//! ```

use fieldsnap_uploads::storage::{ObjectStore, Storage, StorageConfig};

/// Setup helper that creates a Storage instance if MinIO is available
fn setup_storage() -> Option<Storage> {
    if std::env::var("S3_ENDPOINT").is_err() {
        return None;
    }

    match StorageConfig::from_env() {
        Ok(config) => Some(Storage::new(config)),
        Err(e) => {
            eprintln!("Invalid storage configuration: {}", e);
            None
        },
    }
}

fn test_key(test_name: &str, suffix: &str) -> String {
    format!("test/{}/{}-{}", test_name, uuid::Uuid::new_v4(), suffix)
}

#[tokio::test]
async fn test_upload_then_download() {
    let Some(storage) = setup_storage() else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let key = test_key("upload_download", "photo.jpg");
    let data: Vec<u8> = (0..=255).collect();

    storage
        .upload(&key, data.clone(), "image/jpeg")
        .await
        .expect("Upload should succeed");

    let downloaded = storage.download(&key).await.expect("Download should succeed");
    assert_eq!(downloaded, data);
}

#[tokio::test]
async fn test_put_reports_checksum_and_size() {
    let Some(storage) = setup_storage() else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let key = test_key("put_checksum", "photo.jpg");
    let result = storage
        .put(&key, b"Hello, Storage!".to_vec(), "image/jpeg")
        .await
        .expect("Upload should succeed");

    assert_eq!(result.key, key);
    assert_eq!(result.size, 15);
    assert_eq!(result.checksum.len(), 64);
}

#[tokio::test]
async fn test_public_url_contains_key() {
    let Some(storage) = setup_storage() else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    let url = ObjectStore::public_url(&storage, "S1/before/id-a.jpg");
    assert!(url.ends_with("/S1/before/id-a.jpg"));
}
