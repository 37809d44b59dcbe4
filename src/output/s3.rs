use super::remote::ObjectStore;
use crate::error::CaptureError;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

/// Amazon S3 bucket access through the AWS SDK.
///
/// The SDK is async; the store owns a current-thread runtime and blocks on
/// every call so the capture loop stays synchronous. Retries are left to
/// [`super::RemoteSink`] so there is a single backoff policy.
pub struct S3Store {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `region` using the default credential chain.
    pub fn connect(bucket: impl Into<String>, region: impl Into<String>) -> Result<Self, CaptureError> {
        let bucket = bucket.into();
        let region = region.into();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CaptureError::ConfigInvalid(format!("failed to start async runtime: {e}")))?;

        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.clone()))
                .retry_config(RetryConfig::disabled())
                .load(),
        );
        tracing::debug!(bucket = %bucket, region = %region, "S3 client configured");

        Ok(Self {
            runtime,
            client: Client::new(&config),
            bucket,
        })
    }
}

/// Throttling, server-side errors and connection trouble are worth retrying.
fn is_transient<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(_) => err
            .raw_response()
            .map(|raw| raw.status().as_u16())
            .is_some_and(|status| status == 429 || (500..600).contains(&status)),
        _ => false,
    }
}

impl ObjectStore for S3Store {
    fn check_access(&self) -> Result<(), CaptureError> {
        let result = self
            .runtime
            .block_on(self.client.head_bucket().bucket(&self.bucket).send());

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service)) if service.raw().status().as_u16() == 404 => Err(
                CaptureError::ConfigInvalid(format!("S3 bucket '{}' does not exist", self.bucket)),
            ),
            Err(e) => Err(CaptureError::ConfigInvalid(format!(
                "cannot access S3 bucket '{}': {}",
                self.bucket,
                DisplayErrorContext(&e)
            ))),
        }
    }

    fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> Result<String, CaptureError> {
        let key = key.trim_start_matches('/');
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body.to_vec()))
            .send();

        match self.runtime.block_on(request) {
            Ok(_) => Ok(format!("s3://{}/{}", self.bucket, key)),
            Err(e) => Err(CaptureError::delivery(
                format!("S3 upload of {key} failed: {}", DisplayErrorContext(&e)),
                is_transient(&e),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
