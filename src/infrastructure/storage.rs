use crate::config::S3Config;
use crate::services::storage::S3ObjectStorage;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &S3Config) -> Arc<S3ObjectStorage> {
    info!(
        "☁️  S3 Storage: bucket={} region={}",
        config.bucket, config.region
    );

    let aws_config = aws_config::from_env()
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let client = aws_sdk_s3::Client::new(&aws_config);
    Arc::new(S3ObjectStorage::new(client, config.bucket.clone()))
}
