//! HTTP(S) object fetcher.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::{FileError, ObjectFetcher};
use crate::types::{FileReference, RemoteCredentials};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches `http://` / `https://` references with `reqwest`.
///
/// Status mapping: 404/410 → [`FileError::NotFound`], 401/403 →
/// [`FileError::AccessDenied`], anything else non-success and all transport
/// failures → [`FileError::Network`]. Credentials, when present, are sent
/// as a bearer token on the access key.
pub struct HttpObjectFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpObjectFetcher {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for HttpObjectFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectFetcher for HttpObjectFetcher {
    async fn fetch(
        &self,
        reference: &FileReference,
        credentials: Option<&RemoteCredentials>,
        dest: &Path,
    ) -> Result<(), FileError> {
        let url = Url::parse(&reference.uri).map_err(|err| FileError::Network {
            uri: reference.uri.clone(),
            message: format!("invalid url: {err}"),
        })?;

        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(creds) = credentials {
            request = request.bearer_auth(&creds.access_key);
        }

        let response = request.send().await.map_err(|err| transport_error(reference, &err))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FileError::NotFound {
                    uri: reference.uri.clone(),
                });
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FileError::AccessDenied {
                    uri: reference.uri.clone(),
                });
            }
            status if !status.is_success() => {
                return Err(FileError::Network {
                    uri: reference.uri.clone(),
                    message: format!("unexpected status {status}"),
                });
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(reference, &err))?;
        tokio::fs::write(dest, &body)
            .await
            .map_err(|err| FileError::Io {
                uri: reference.uri.clone(),
                message: err.to_string(),
            })?;
        Ok(())
    }
}

fn transport_error(reference: &FileReference, err: &reqwest::Error) -> FileError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    FileError::Network {
        uri: reference.uri.clone(),
        message,
    }
}
