//! Amazon S3 backend.
//!
//! Wraps the async `aws-sdk-s3` client behind the blocking [`ObjectStorage`]
//! trait. The client and the tokio runtime that drives it are owned by the
//! [`S3Storage`] value, so one command run constructs exactly one client.
//!
//! Credentials and region come from the standard AWS provider chain
//! (environment, shared config files, instance metadata), optionally
//! overridden by [`S3Settings`].

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use super::{ObjectMetadata, ObjectPage, ObjectRecord, ObjectStorage, StorageError};
use crate::config::S3Settings;

/// Blocking S3 client.
pub struct S3Storage {
    client: Client,
    runtime: Runtime,
    max_keys: Option<i32>,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("max_keys", &self.max_keys)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    /// Build a client from the AWS environment plus `settings` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Runtime`] if the tokio runtime cannot start.
    pub fn connect(settings: &S3Settings, page_size: Option<usize>) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Runtime(e.to_string()))?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &settings.region {
                loader = loader.region(Region::new(region.clone()));
            }
            let sdk_config = loader.load().await;

            let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
            if let Some(endpoint) = &settings.endpoint_url {
                builder = builder.endpoint_url(endpoint);
            }
            if settings.force_path_style {
                builder = builder.force_path_style(true);
            }
            Client::from_conf(builder.build())
        });

        log::debug!(
            "S3 client ready (region: {:?}, endpoint: {:?})",
            settings.region,
            settings.endpoint_url
        );

        Ok(Self {
            client,
            runtime,
            max_keys: page_size.map(|n| i32::try_from(n).unwrap_or(i32::MAX)),
        })
    }
}

/// Classify an SDK error for a bucket-scoped call.
fn bucket_error<E>(operation: &'static str, bucket: &str, err: &E) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.code() {
        Some("NoSuchBucket") => StorageError::BucketNotFound(bucket.to_string()),
        Some("AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId") => {
            StorageError::AccessDenied(bucket.to_string())
        }
        // Regional redirects surface as a bare 301 without a code; the bucket
        // is not reachable through this client either way.
        Some("PermanentRedirect") => StorageError::AccessDenied(bucket.to_string()),
        _ => StorageError::Service {
            operation,
            message: DisplayErrorContext(err).to_string(),
        },
    }
}

impl ObjectStorage for S3Storage {
    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        self.runtime.block_on(async {
            let mut names = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let output = self
                    .client
                    .list_buckets()
                    .set_continuation_token(token.take())
                    .send()
                    .await
                    .map_err(|e| StorageError::Service {
                        operation: "ListBuckets",
                        message: DisplayErrorContext(&e).to_string(),
                    })?;

                names.extend(
                    output
                        .buckets()
                        .iter()
                        .filter_map(|b| b.name().map(str::to_string)),
                );

                match output.continuation_token() {
                    Some(next) if !next.is_empty() => token = Some(next.to_string()),
                    _ => break,
                }
            }
            Ok(names)
        })
    }

    fn list_objects_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(bucket)
                    .set_continuation_token(continuation.map(str::to_string))
                    .set_max_keys(self.max_keys)
                    .send(),
            )
            .map_err(|e| bucket_error("ListObjectsV2", bucket, &e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                let size = obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                let digest = obj.e_tag().unwrap_or_default();
                Some(ObjectRecord::new(key, size, digest))
            })
            .collect();

        let next_continuation = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_continuation,
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.runtime
            .block_on(self.client.delete_object().bucket(bucket).key(key).send())
            .map(|_| ())
            .map_err(|e| bucket_error("DeleteObject", bucket, &e))
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let result = self
            .runtime
            .block_on(self.client.head_object().bucket(bucket).key(key).send());

        match result {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output
                    .content_length()
                    .and_then(|s| u64::try_from(s).ok())
                    .unwrap_or(0),
                digest: output.e_tag().map(str::to_string),
            })),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(bucket_error("HeadObject", bucket, &e)),
        }
    }
}
