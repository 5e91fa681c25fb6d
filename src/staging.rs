//! Copies provider artifacts from the catalog into the bootstrap bucket.
use crate::aws::{AwsError, ObjectStore};
use crate::registry::ProviderDescriptor;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info};

/// Characters left as-is in an encoded copy source. Path separators must
/// survive so S3 can split bucket from key.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("provider {provider} has no {what} location in the registry")]
    MissingSource {
        provider: String,
        what: &'static str,
    },

    #[error("invalid S3 location '{0}': expected bucket/key")]
    InvalidSource(String),

    #[error("copying {what} into {bucket}/{key}: {source}")]
    Copy {
        what: &'static str,
        bucket: String,
        key: String,
        #[source]
        source: AwsError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAssets {
    /// HTTPS URL of the staged template, usable as a CloudFormation `TemplateURL`.
    pub template_url: String,
    /// Bucket key of the staged handler package.
    pub handler_key: String,
}

/// Normalises `s3://bucket/key`, `arn:aws:s3:::bucket/key` or `bucket/key`
/// into an encoded `bucket/key` copy source.
pub fn copy_source(location: &str) -> Result<String, StagingError> {
    let trimmed = location
        .strip_prefix("s3://")
        .or_else(|| {
            location
                .strip_prefix("arn:")
                .and_then(|rest| rest.split_once(":s3:::"))
                .map(|(_, path)| path)
        })
        .unwrap_or(location)
        .trim_start_matches('/');

    match trimmed.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok(utf8_percent_encode(trimmed, COPY_SOURCE).to_string())
        }
        _ => Err(StagingError::InvalidSource(location.to_string())),
    }
}

pub fn template_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
}

/// Copies the handler package and template for `provider` into `bucket`.
pub async fn stage_assets(
    store: &dyn ObjectStore,
    bucket: &str,
    region: &str,
    provider: &ProviderDescriptor,
) -> Result<StagedAssets, StagingError> {
    let id = &provider.id;
    let prefix = format!("{}/{}/{}", id.publisher, id.name, id.version);
    let handler_key = format!("{prefix}/handler.zip");
    let template_key = format!("{prefix}/cloudformation.json");

    info!(provider = %id, %bucket, "copying provider assets to the bootstrap bucket");
    for (what, source, key) in [
        ("handler package", &provider.handler_asset, &handler_key),
        ("CloudFormation template", &provider.template_asset, &template_key),
    ] {
        if source.is_empty() {
            return Err(StagingError::MissingSource {
                provider: id.to_string(),
                what,
            });
        }
        let encoded = copy_source(source)?;
        debug!(%what, source = %encoded, %bucket, %key, "copying object");
        store
            .copy_object(&encoded, bucket, key)
            .await
            .map_err(|source| StagingError::Copy {
                what,
                bucket: bucket.to_string(),
                key: key.clone(),
                source,
            })?;
    }

    Ok(StagedAssets {
        template_url: template_url(bucket, region, &template_key),
        handler_key,
    })
}
