use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use fhirseed_core::{EntityKind, StoreId};

use crate::transport::{Created, Issue, StoreError, StoreTransport};

const FHIR_JSON: &str = "application/fhir+json";

/// FHIR REST transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

/// Status, `Location` header and parsed body of one response.
#[derive(Debug)]
struct Reply {
    status: StatusCode,
    location: Option<String>,
    body: Value,
}

impl Reply {
    /// Turn a non-success status into a rejection, keeping the outcome
    /// issues when the store sent any.
    fn into_success(self) -> Result<Self, StoreError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let mut issues = Issue::from_outcome(&self.body);
        if issues.is_empty() {
            issues.push(Issue::error(format!("HTTP {}", self.status)));
        }
        Err(StoreError::Rejection { issues })
    }
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// `http://{host}:{port}/{path}`.
    pub fn base_url_from_parts(host: &str, port: u16, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("http://{host}:{port}")
        } else {
            format!("http://{host}:{port}/{path}")
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_url, suffix)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Reply, StoreError> {
        let response = request
            .header(ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;
        debug!(status = status.as_u16(), bytes = text.len(), "store response");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) if !status.is_success() => Value::Null,
                Err(err) => return Err(StoreError::Decode(err.to_string())),
            }
        };
        Ok(Reply {
            status,
            location,
            body,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl StoreTransport for HttpTransport {
    async fn create(&self, kind: EntityKind, resource: &Value) -> Result<Created, StoreError> {
        let request = self
            .client
            .post(self.url(kind.resource_type()))
            .header(CONTENT_TYPE, FHIR_JSON)
            .json(resource);
        let reply = self.send(request).await?.into_success()?;

        let store_id = reply
            .body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                reply
                    .location
                    .as_deref()
                    .and_then(|location| id_from_location(location, kind))
            })
            .ok_or_else(|| {
                StoreError::Decode(format!("create of {kind} returned no resource id"))
            })?;

        let issues = Issue::from_outcome(&reply.body);
        Ok(Created {
            store_id: StoreId::new(store_id),
            issues,
        })
    }

    async fn search(
        &self,
        kind: EntityKind,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, StoreError> {
        let request = self.client.get(self.url(kind.resource_type())).query(query);
        let reply = self.send(request).await?.into_success()?;
        Ok(reply
            .body
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("resource").cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn validate(&self, kind: EntityKind, resource: &Value) -> Result<Vec<Issue>, StoreError> {
        let request = self
            .client
            .post(self.url(&format!("{}/$validate", kind.resource_type())))
            .header(CONTENT_TYPE, FHIR_JSON)
            .json(resource);
        let reply = self.send(request).await?;
        let issues = Issue::from_outcome(&reply.body);
        if issues.is_empty() {
            reply.into_success()?;
        }
        Ok(issues)
    }

    async fn delete(&self, kind: EntityKind, store_id: &StoreId) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.url(&format!("{}/{}", kind.resource_type(), store_id)));
        self.send(request).await?.into_success()?;
        Ok(())
    }
}

/// Id segment after `{Type}/` in a `Location` such as
/// `http://host/fhir/Patient/123/_history/1`.
fn id_from_location(location: &str, kind: EntityKind) -> Option<String> {
    let mut segments = location.split('/');
    segments.find(|segment| *segment == kind.resource_type())?;
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_parts() {
        assert_eq!(
            HttpTransport::base_url_from_parts("localhost", 8080, "/fhir"),
            "http://localhost:8080/fhir"
        );
        assert_eq!(
            HttpTransport::base_url_from_parts("store", 80, "/"),
            "http://store:80"
        );
    }

    #[test]
    fn location_header_yields_id() {
        assert_eq!(
            id_from_location("http://h/fhir/Patient/123/_history/1", EntityKind::Patient).as_deref(),
            Some("123")
        );
        assert_eq!(id_from_location("http://h/fhir/Patient/", EntityKind::Patient), None);
    }

    #[test]
    fn non_success_without_outcome_carries_status() {
        let reply = Reply {
            status: StatusCode::BAD_GATEWAY,
            location: None,
            body: Value::Null,
        };
        let err = reply.into_success().unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
