//! Uploaders that receive replayed span batches.
//!
//! The replayer hands every decoded, non-empty batch to an [`Uploader`].
//! With the `otlp-http` feature, [`OtlpHttpUploader`] pushes batches to an
//! OTLP/HTTP collector endpoint as protobuf `ExportTraceServiceRequest`s.

use crate::error::UploadError;
use crate::proto::ResourceSpans;

/// Receives decoded span batches, one call per spooled batch.
pub trait Uploader {
    /// Uploads one batch. `spans` is never empty.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] if the batch was not accepted; replay of the
    /// current file stops at the first failure.
    fn upload(&mut self, spans: &[ResourceSpans]) -> Result<(), UploadError>;
}

impl<U: Uploader + ?Sized> Uploader for &mut U {
    fn upload(&mut self, spans: &[ResourceSpans]) -> Result<(), UploadError> {
        (**self).upload(spans)
    }
}

impl<U: Uploader + ?Sized> Uploader for Box<U> {
    fn upload(&mut self, spans: &[ResourceSpans]) -> Result<(), UploadError> {
        (**self).upload(spans)
    }
}

#[cfg(feature = "otlp-http")]
pub use http::{OtlpHttpConfig, OtlpHttpUploader};

#[cfg(feature = "otlp-http")]
mod http {
    use std::time::Duration;

    use prost::Message;
    use tracing::debug;

    use super::Uploader;
    use crate::error::UploadError;
    use crate::proto::{ExportTraceServiceRequest, ResourceSpans};

    /// Configuration for an OTLP/HTTP trace endpoint.
    #[derive(Debug, Clone)]
    pub struct OtlpHttpConfig {
        /// Trace endpoint URL (e.g., `http://localhost:4318/v1/traces`).
        pub endpoint: String,
        /// HTTP timeout for export requests.
        pub timeout: Duration,
        /// Maximum number of retry attempts on failure.
        pub max_retries: u32,
        /// Initial backoff duration between retries (doubles each attempt).
        pub retry_backoff: Duration,
        /// Optional HTTP headers (e.g., for authentication).
        pub headers: Vec<(String, String)>,
    }

    impl OtlpHttpConfig {
        /// Creates a new config with sensible defaults.
        ///
        /// Defaults: 30s timeout, 3 retries, 100ms initial backoff.
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self {
                endpoint: endpoint.into(),
                timeout: Duration::from_secs(30),
                max_retries: 3,
                retry_backoff: Duration::from_millis(100),
                headers: Vec::new(),
            }
        }

        /// Adds an HTTP header (e.g., for authentication tokens).
        #[must_use]
        pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.headers.push((name.into(), value.into()));
            self
        }

        /// Sets the HTTP timeout.
        #[must_use]
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }

        /// Sets the maximum number of retries.
        #[must_use]
        pub fn with_max_retries(mut self, max_retries: u32) -> Self {
            self.max_retries = max_retries;
            self
        }
    }

    /// Blocking OTLP/HTTP protobuf uploader.
    #[derive(Debug)]
    pub struct OtlpHttpUploader {
        config: OtlpHttpConfig,
        client: reqwest::blocking::Client,
    }

    impl OtlpHttpUploader {
        /// Builds the HTTP client for `config`.
        ///
        /// # Errors
        ///
        /// Returns [`UploadError::ClientCreate`] if the client cannot be built.
        pub fn new(config: OtlpHttpConfig) -> Result<Self, UploadError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| UploadError::ClientCreate { source: e })?;
            Ok(Self { config, client })
        }

        /// Returns the endpoint configuration.
        pub fn config(&self) -> &OtlpHttpConfig {
            &self.config
        }

        /// Sends the body with exponential backoff retry.
        fn send_with_retry(&self, body: &[u8]) -> Result<(), UploadError> {
            let mut backoff = self.config.retry_backoff;
            let mut attempt = 0;

            loop {
                let mut request = self
                    .client
                    .post(&self.config.endpoint)
                    .header("Content-Type", "application/x-protobuf");

                for (name, value) in &self.config.headers {
                    request = request.header(name, value);
                }

                let error = match request.body(body.to_vec()).send() {
                    Ok(resp) if resp.status().is_success() => return Ok(()),
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        let body = resp.text().unwrap_or_default();
                        UploadError::HttpStatus { status, body }
                    }
                    Err(e) => UploadError::RequestFailed { source: e },
                };

                if attempt >= self.config.max_retries {
                    return Err(error);
                }
                debug!(attempt, error = %error, "export request failed, retrying");
                std::thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
        }
    }

    impl Uploader for OtlpHttpUploader {
        fn upload(&mut self, spans: &[ResourceSpans]) -> Result<(), UploadError> {
            let body = encode_request(spans)?;
            self.send_with_retry(&body)
        }
    }

    /// Wraps a batch in an `ExportTraceServiceRequest` and encodes it.
    pub(super) fn encode_request(spans: &[ResourceSpans]) -> Result<Vec<u8>, UploadError> {
        let request = ExportTraceServiceRequest {
            resource_spans: spans.to_vec(),
        };
        let mut buf = Vec::with_capacity(request.encoded_len());
        request
            .encode(&mut buf)
            .map_err(|e| UploadError::Serialization { source: e })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(usize);

    impl Uploader for Counting {
        fn upload(&mut self, spans: &[ResourceSpans]) -> Result<(), UploadError> {
            self.0 += spans.len();
            Ok(())
        }
    }

    #[test]
    fn test_forwarding_impls() {
        let mut counting = Counting(0);
        {
            let mut by_ref: &mut Counting = &mut counting;
            by_ref.upload(&[ResourceSpans::default()]).unwrap();
        }
        assert_eq!(counting.0, 1);

        let mut boxed: Box<dyn Uploader> = Box::new(Counting(0));
        boxed
            .upload(&[ResourceSpans::default(), ResourceSpans::default()])
            .unwrap();
    }

    #[cfg(feature = "otlp-http")]
    #[test]
    fn test_encode_request_roundtrip() {
        use crate::proto::ExportTraceServiceRequest;
        use prost::Message;

        let spans = vec![ResourceSpans {
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
            ..Default::default()
        }];
        let bytes = http::encode_request(&spans).unwrap();
        let decoded = ExportTraceServiceRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.resource_spans, spans);
    }

    #[cfg(feature = "otlp-http")]
    #[test]
    fn test_config_builder() {
        let config = OtlpHttpConfig::new("http://collector:4318/v1/traces")
            .with_header("Authorization", "Bearer token123")
            .with_timeout(std::time::Duration::from_secs(10))
            .with_max_retries(5);

        assert_eq!(config.endpoint, "http://collector:4318/v1/traces");
        assert_eq!(config.timeout, std::time::Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.headers.len(), 1);
    }
}
