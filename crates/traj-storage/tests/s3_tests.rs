//! S3 integration tests.

use futures::StreamExt;
use traj_storage::{RemoteStore, S3Store, StoreConfig};

fn bucket() -> String {
    std::env::var("TRAJ_BUCKET").unwrap_or_else(|_| "r2d2-data".to_string())
}

/// Test bucket access with the configured credentials.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_s3_connectivity() {
    let config = StoreConfig::from_env(bucket()).expect("Failed to read store config");
    let store = S3Store::new(config).await.expect("Failed to create S3 client");

    store
        .check_connectivity()
        .await
        .expect("Bucket should be reachable");
}

/// Test that listing the metadata prefix yields keys under that prefix.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_list_metadata_prefix() {
    let prefix = std::env::var("TRAJ_SOURCE_PREFIX").unwrap_or_else(|_| "lab-uploads-json".to_string());
    let config = StoreConfig::from_env(bucket()).expect("Failed to read store config");
    let store = S3Store::new(config).await.expect("Failed to create S3 client");

    let keys: Vec<String> = store
        .list(&prefix)
        .take(25)
        .map(|key| key.expect("Listing page failed"))
        .collect()
        .await;

    assert!(keys.iter().all(|k| k.starts_with(&prefix)));
}

/// Test that a missing object maps to `NotFound`.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_missing_object_is_not_found() {
    let config = StoreConfig::from_env(bucket()).expect("Failed to read store config");
    let store = S3Store::new(config).await.expect("Failed to create S3 client");

    let err = store
        .get_object("lab-uploads-json/__does_not_exist__.json")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
}
