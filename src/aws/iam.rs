use super::{AwsError, RoleDirectory};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::Client;

pub struct IamRoles {
    client: Client,
}

impl IamRoles {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl RoleDirectory for IamRoles {
    async fn role_exists(&self, name: &str) -> Result<bool, AwsError> {
        match self.client.get_role().role_name(name).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(AwsError::api("iam", e)),
        }
    }
}
