use super::{AwsError, SecretStore};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::types::ParameterType;
use secrecy::{ExposeSecret, SecretString};

/// SSM Parameter Store, writing `SecureString` parameters.
pub struct SsmSecretStore {
    client: Client,
}

impl SsmSecretStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    async fn put_secret(&self, path: &str, value: &SecretString) -> Result<(), AwsError> {
        self.client
            .put_parameter()
            .name(path)
            .value(value.expose_secret())
            .r#type(ParameterType::SecureString)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| AwsError::api("ssm", e))?;
        Ok(())
    }
}
