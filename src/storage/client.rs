use super::{ObjectStore, StoredObject};
use crate::config::{Config, DEFAULT_S3_REGION};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::{config::Region, Client as S3Client};

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub async fn new(config: &Config) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.s3_access_key_id.clone(),
            config.s3_secret_access_key.clone(),
            None,
            None,
            "board-relay",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.s3_region.clone()))
            .endpoint_url(&config.s3_endpoint)
            .load()
            .await;

        // MinIO and most self-hosted stores only serve path-style URLs
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        tracing::info!(
            "S3 client bound to {} (bucket {})",
            config.s3_endpoint,
            config.s3_bucket
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
            region: config.s3_region.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if not_found {
                    Ok(false)
                } else {
                    Err(Error::S3(format!(
                        "Failed to check bucket {}: {}",
                        self.bucket, err
                    )))
                }
            }
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                tracing::debug!("Bucket {} was created concurrently", self.bucket);
                Ok(())
            }
            Err(err) => Err(Error::S3(format!(
                "Failed to create bucket {}: {}",
                self.bucket, err
            ))),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::S3(format!("Failed to upload {}: {}", key, e)))?;

        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            etag: output.e_tag().map(str::to_string),
        })
    }
}
