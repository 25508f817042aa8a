//! Object storage backed by an S3 bucket. The SDK is async; the store owns a
//! small current-thread runtime and blocks on each call so the rest of the
//! pipeline stays synchronous.

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use tokio::runtime::Runtime;

use crate::store::{ObjectData, ObjectStore, StoreError, normalize_key};

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    runtime: Runtime,
}

impl S3ObjectStore {
    /// Builds a client from the standard AWS environment (credentials,
    /// region, endpoint overrides).
    pub fn from_env(bucket: &str) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| StoreError::Unavailable {
                message: format!("failed to start runtime: {err}"),
            })?;
        let config = runtime.block_on(aws_config::load_from_env());
        let client = aws_sdk_s3::Client::new(&config);
        Ok(Self {
            client,
            bucket: bucket.to_string(),
            runtime,
        })
    }

    fn bucket_exists(&self) -> bool {
        self.runtime
            .block_on(self.client.head_bucket().bucket(&self.bucket).send())
            .is_ok()
    }

    fn missing_bucket(&self) -> StoreError {
        StoreError::Unavailable {
            message: format!("bucket {} does not exist or is not accessible", self.bucket),
        }
    }
}

fn trim_etag(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}

impl ObjectStore for S3ObjectStore {
    fn location(&self) -> &str {
        &self.bucket
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        log::debug!("listing s3://{}/{}", self.bucket, prefix);
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(normalize_key(prefix));
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let output = self
                .runtime
                .block_on(request.send())
                .map_err(|err| StoreError::Unavailable {
                    message: DisplayErrorContext(&err).to_string(),
                })?;
            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }
            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }
        Ok(keys)
    }

    fn head(&self, key: &str) -> Result<String, StoreError> {
        let result = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(normalize_key(key))
                .send(),
        );
        match result {
            Ok(output) => Ok(output.e_tag().map(trim_etag).unwrap_or_default()),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    if self.bucket_exists() {
                        return Err(StoreError::NotFound {
                            key: key.to_string(),
                        });
                    }
                    return Err(self.missing_bucket());
                }
                Err(StoreError::Unavailable {
                    message: DisplayErrorContext(&err).to_string(),
                })
            }
        }
    }

    fn get(&self, key: &str) -> Result<ObjectData, StoreError> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(normalize_key(key))
                    .send(),
            )
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Unavailable {
                        message: DisplayErrorContext(&err).to_string(),
                    }
                }
            })?;
        let fingerprint = output.e_tag().map(trim_etag).unwrap_or_default();
        let body = self
            .runtime
            .block_on(output.body.collect())
            .map_err(|err| StoreError::Unavailable {
                message: format!("failed to read s3://{}/{}: {}", self.bucket, key, err),
            })?;
        log::info!("downloaded s3://{}/{}", self.bucket, key);
        Ok(ObjectData {
            bytes: body.into_bytes().to_vec(),
            fingerprint,
        })
    }
}
