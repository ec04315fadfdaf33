use std::time::Duration;

use async_trait::async_trait;
use charter_core::{BearerToken, ContentSnapshot, RemoteContentService, RemoteId, RemoteSnapshot};
use config::RemoteConfig;
use errors::RemoteError;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    remote_id: RemoteId
}

/// REST client for the remote content service.
///
/// | Call | Request |
/// |------|---------|
/// | create | `POST {base}/content` |
/// | update | `PUT {base}/content/{id}` |
/// | delete | `DELETE {base}/content/{id}` |
/// | increment fork count | `POST {base}/content/{id}/forks` |
/// | fetch | `GET {base}/content/{id}` |
///
/// Every request is bounded by `timeout`; running out of time surfaces as
/// `RemoteError::Timeout` carrying that bound.
pub struct HttpRemoteContentService {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration
}

impl HttpRemoteContentService {
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network {
                reason: format!("failed to build HTTP client: {e}")
            })?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout
        })
    }

    fn content_url(&self, remote_id: Option<&RemoteId>) -> String {
        match remote_id {
            Some(id) => format!("{}/content/{}", self.base_url, id),
            None => format!("{}/content", self.base_url)
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        remote_id: Option<&RemoteId>
    ) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(%status, url = %response.url(), "Remote content service responded");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body, remote_id, retry_after))
    }

    fn transport_error(&self, error: reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64
            }
        } else {
            RemoteError::Network {
                reason: error.to_string()
            }
        }
    }
}

/// HTTP status to failure class: 408, 429 and 5xx are transient, 401 waits
/// for authentication, other 4xx are permanent.
pub fn classify_status(
    status: StatusCode,
    body: String,
    remote_id: Option<&RemoteId>,
    retry_after_secs: Option<u64>
) -> RemoteError {
    let reason = if body.is_empty() {
        status.to_string()
    } else {
        body
    };

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized { reason },
        StatusCode::FORBIDDEN => RemoteError::Forbidden { reason },
        StatusCode::NOT_FOUND => RemoteError::NotFound {
            remote_id: remote_id.map(ToString::to_string).unwrap_or(reason)
        },
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(0)
        },
        StatusCode::REQUEST_TIMEOUT => RemoteError::Server {
            status: status.as_u16(),
            reason
        },
        s if s.is_client_error() => RemoteError::Validation { reason },
        s => RemoteError::Server {
            status: s.as_u16(),
            reason
        }
    }
}

fn decode_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Validation {
        reason: format!("malformed response body: {error}")
    }
}

#[async_trait]
impl RemoteContentService for HttpRemoteContentService {
    async fn create(
        &self,
        token: &BearerToken,
        snapshot: &ContentSnapshot
    ) -> Result<RemoteId, RemoteError> {
        let request = self
            .client
            .post(self.content_url(None))
            .bearer_auth(token.expose())
            .json(snapshot);
        let response = self.send(request, None).await?;
        let created: CreateResponse = response.json().await.map_err(decode_error)?;
        Ok(created.remote_id)
    }

    async fn update(
        &self,
        token: &BearerToken,
        remote_id: &RemoteId,
        snapshot: &ContentSnapshot
    ) -> Result<(), RemoteError> {
        let request = self
            .client
            .put(self.content_url(Some(remote_id)))
            .bearer_auth(token.expose())
            .json(snapshot);
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    async fn delete(&self, token: &BearerToken, remote_id: &RemoteId) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.content_url(Some(remote_id)))
            .bearer_auth(token.expose());
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    async fn increment_fork_count(
        &self,
        token: &BearerToken,
        remote_id: &RemoteId
    ) -> Result<(), RemoteError> {
        let url = format!("{}/forks", self.content_url(Some(remote_id)));
        let request = self.client.post(url).bearer_auth(token.expose());
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        token: Option<&BearerToken>,
        remote_id: &RemoteId
    ) -> Result<RemoteSnapshot, RemoteError> {
        let mut request = self.client.get(self.content_url(Some(remote_id)));
        if let Some(token) = token {
            request = request.bearer_auth(token.expose());
        }
        let response = self.send(request, Some(remote_id)).await?;
        response.json().await.map_err(decode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::FailureClass;

    #[test]
    fn test_status_classification() {
        let id = RemoteId::new("r-1");
        let cases = [
            (StatusCode::REQUEST_TIMEOUT, FailureClass::Transient),
            (StatusCode::TOO_MANY_REQUESTS, FailureClass::Transient),
            (StatusCode::INTERNAL_SERVER_ERROR, FailureClass::Transient),
            (StatusCode::SERVICE_UNAVAILABLE, FailureClass::Transient),
            (StatusCode::UNAUTHORIZED, FailureClass::Auth),
            (StatusCode::BAD_REQUEST, FailureClass::Permanent),
            (StatusCode::FORBIDDEN, FailureClass::Permanent),
            (StatusCode::NOT_FOUND, FailureClass::Permanent),
            (StatusCode::CONFLICT, FailureClass::Permanent),
            (StatusCode::UNPROCESSABLE_ENTITY, FailureClass::Permanent)
        ];

        for (status, expected) in cases {
            let error = classify_status(status, String::new(), Some(&id), None);
            assert_eq!(error.class(), expected, "{status}");
        }
    }

    #[test]
    fn test_not_found_carries_remote_id() {
        let error = classify_status(
            StatusCode::NOT_FOUND,
            "gone".to_string(),
            Some(&RemoteId::new("r-9")),
            None
        );
        assert_eq!(
            error,
            RemoteError::NotFound {
                remote_id: "r-9".to_string()
            }
        );
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let error = classify_status(StatusCode::TOO_MANY_REQUESTS, String::new(), None, Some(12));
        assert_eq!(
            error,
            RemoteError::RateLimited {
                retry_after_secs: 12
            }
        );
    }
}
