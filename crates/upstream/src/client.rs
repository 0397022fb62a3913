//! GraphQL request/response transport.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use gnodex_core::error::{ClientError, ClientResult};

/// Default request deadline.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(20);

/// How much of an offending body to keep in error messages.
const ERROR_SAMPLE_LEN: usize = 600;

/// GraphQL-over-HTTP client.
///
/// One shot per call: no internal retries, a single 20 s deadline.
#[derive(Clone)]
pub struct GraphqlClient {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl GraphqlClient {
    /// Create a client for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a query document and decode `data` into `T`.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> ClientResult<T> {
        let mut body = json!({ "query": document });
        if !variables.is_null() {
            body["variables"] = variables;
        }

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let raw = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::Transport(format!(
                "http {} from {}: {}",
                status.as_u16(),
                self.endpoint,
                sample(&raw)
            )));
        }

        let media_type = media_type(&content_type);
        if !media_type.is_empty()
            && media_type != "application/json"
            && media_type != "application/graphql-response+json"
        {
            return Err(ClientError::Content(format!(
                "unexpected content-type {:?} from {}: {}",
                content_type,
                self.endpoint,
                sample(&raw)
            )));
        }

        let decoded: GraphqlResponse<T> = serde_json::from_str(&raw)
            .map_err(|e| ClientError::Decode(format!("{}; body: {}", e, sample(&raw))))?;

        if !decoded.errors.is_empty() {
            return Err(ClientError::Upstream(
                serde_json::to_string(&decoded.errors).unwrap_or_else(|_| "unprintable".into()),
            ));
        }

        debug!("Query completed");
        decoded
            .data
            .ok_or_else(|| ClientError::Decode("response carried no data".into()))
    }
}

/// Strip parameters from a content-type header value.
fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

/// Trim a response body for inclusion in an error message.
fn sample(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() > ERROR_SAMPLE_LEN {
        let mut end = ERROR_SAMPLE_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...(truncated)", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_drops_parameters() {
        assert_eq!(media_type("application/json; charset=utf-8"), "application/json");
        assert_eq!(media_type("application/graphql-response+json"), "application/graphql-response+json");
        assert_eq!(media_type(""), "");
    }

    #[test]
    fn sample_truncates_long_bodies() {
        let long = "x".repeat(2000);
        let sampled = sample(&long);
        assert!(sampled.ends_with("...(truncated)"));
        assert!(sampled.len() < long.len());
    }

    #[test]
    fn sample_keeps_short_bodies_verbatim() {
        assert_eq!(sample("  {\"ok\":true} \n"), "{\"ok\":true}");
    }

    #[test]
    fn response_decoding_tolerates_missing_errors() {
        let decoded: GraphqlResponse<serde_json::Value> =
            serde_json::from_str(r#"{"data": {"x": 1}}"#).unwrap();
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.data.unwrap()["x"], 1);
    }
}
