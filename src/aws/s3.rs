use super::{AwsError, ObjectStore};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn copy_object(&self, source: &str, bucket: &str, key: &str) -> Result<(), AwsError> {
        self.client
            .copy_object()
            .copy_source(source)
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AwsError::api("s3", e))?;
        Ok(())
    }
}
