//! Firebase Realtime Database REST backend.
//!
//! # Responsibility
//! - Create a note as a JSON string at `{database_url}/{collection}/{key}.json`
//!   using a conditional (ETag / `if-match`) write, so a taken key is never
//!   overwritten.
//! - Read `{database_url}/{collection}.json` and decode its children.
//! - Map HTTP status codes and transport failures onto `StoreError`.
//!
//! # Invariants
//! - No automatic retry; one request per operation.
//! - `null` payloads mean "no children", never an error.
//! - Non-string child values are never coerced. They are skipped, unless the
//!   child holds the greatest key, which fails the read as `InvalidData`.

use super::{NoteBackend, StoreError, StoreResult, StoredChild};
use crate::key::NoteKey;
use log::{debug, warn};
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 200;
const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

/// Connection settings for one Realtime Database instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtdbSettings {
    /// Database root, e.g. `https://<project>-default-rtdb.firebaseio.com`.
    pub database_url: String,
    /// Sent as the `auth` query parameter when present.
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl RtdbSettings {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// REST client for a Realtime Database instance.
pub struct RtdbBackend {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl RtdbBackend {
    pub fn new(settings: RtdbSettings) -> StoreResult<Self> {
        let raw = settings.database_url.trim();
        let base_url = Url::parse(raw).map_err(|err| {
            StoreError::Misconfigured(format!("invalid database url `{raw}`: {err}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(StoreError::Misconfigured(format!(
                "database url `{raw}` must be an http(s) url"
            )));
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| StoreError::Misconfigured(format!("http client setup failed: {err}")))?;

        Ok(Self {
            client,
            base_url,
            auth_token: settings
                .auth_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `{base}/{segments...}.json` with the auth parameter applied.
    fn resource_url(&self, segments: &[&str]) -> StoreResult<Url> {
        let Some((last, parents)) = segments.split_last() else {
            return Err(StoreError::Misconfigured("empty resource path".to_string()));
        };
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                StoreError::Misconfigured(format!("database url `{}` has no path", self.base_url))
            })?;
            path.pop_if_empty();
            for segment in parents {
                path.push(segment);
            }
            path.push(&format!("{last}.json"));
        }
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }
}

impl NoteBackend for RtdbBackend {
    fn kind(&self) -> &'static str {
        "rtdb"
    }

    async fn create_child(&self, collection: &str, key: &NoteKey, body: &str) -> StoreResult<()> {
        let url = self.resource_url(&[collection, key.as_str()])?;

        debug!("event=rtdb_request module=backend method=GET path={} etag=true", url.path());
        let response = self
            .client
            .get(url.clone())
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = ensure_success(response).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidData("conditional read returned no ETag".to_string()))?;
        let current: Value = response
            .json()
            .await
            .map_err(|err| StoreError::InvalidData(format!("response is not JSON: {err}")))?;
        if !current.is_null() {
            return Err(StoreError::Conflict(format!("{collection}/{key}")));
        }

        debug!("event=rtdb_request module=backend method=PUT path={}", url.path());
        let response = self
            .client
            .put(url)
            .header(IF_MATCH, etag)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn list_children(&self, collection: &str) -> StoreResult<Vec<StoredChild>> {
        let url = self.resource_url(&[collection])?;
        debug!("event=rtdb_request module=backend method=GET path={}", url.path());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = ensure_success(response).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|err| StoreError::InvalidData(format!("response is not JSON: {err}")))?;
        decode_children(payload)
    }
}

/// Decodes a collection snapshot into children.
///
/// Older non-string children are skipped; a non-string child at the greatest
/// key is an error, so the latest note is never silently replaced by an
/// older one.
fn decode_children(payload: Value) -> StoreResult<Vec<StoredChild>> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let newest = map.keys().max().cloned();
            let mut children = Vec::with_capacity(map.len());
            for (key, value) in map {
                match value {
                    Value::String(body) => children.push(StoredChild { key, body }),
                    other if newest.as_ref() == Some(&key) => {
                        return Err(StoreError::InvalidData(format!(
                            "latest child `{key}` holds {} instead of a string",
                            json_type_name(&other)
                        )));
                    }
                    other => warn!(
                        "event=rtdb_decode module=backend status=skipped key={key} value_type={}",
                        json_type_name(&other)
                    ),
                }
            }
            Ok(children)
        }
        other => Err(StoreError::InvalidData(format!(
            "collection snapshot is {} instead of an object",
            json_type_name(&other)
        ))),
    }
}

async fn ensure_success(response: reqwest::Response) -> StoreResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(map_status(status, &error_message(&text)))
}

fn map_status(status: StatusCode, message: &str) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Permission(format!("HTTP {status}: {message}"))
        }
        StatusCode::PAYMENT_REQUIRED
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INSUFFICIENT_STORAGE => StoreError::Quota(format!("HTTP {status}: {message}")),
        StatusCode::PRECONDITION_FAILED => {
            StoreError::Conflict(format!("HTTP {status}: child changed before write"))
        }
        _ => StoreError::Backend(format!("HTTP {status}: {message}")),
    }
}

fn map_transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Network(format!("request timed out: {err}"))
    } else if err.is_connect() || err.is_request() {
        StoreError::Network(err.to_string())
    } else if err.is_decode() {
        StoreError::InvalidData(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Extracts `{"error": "..."}` messages, falling back to the raw body.
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "no error details".to_string();
    }
    let mut truncated: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if message.chars().count() > MAX_ERROR_BODY_CHARS {
        truncated.push_str("...");
    }
    truncated
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode_children, error_message, map_status, RtdbBackend, RtdbSettings,
    };
    use crate::backend::StoreError;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn resource_url_appends_json_suffix_and_auth() {
        let mut settings = RtdbSettings::new("https://demo-default-rtdb.firebaseio.com/");
        settings.auth_token = Some("secret".to_string());
        let backend = RtdbBackend::new(settings).unwrap();

        let url = backend.resource_url(&["notes", "20240101_000000"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo-default-rtdb.firebaseio.com/notes/20240101_000000.json?auth=secret"
        );

        let url = backend.resource_url(&["notes"]).unwrap();
        assert_eq!(url.path(), "/notes.json");
    }

    #[test]
    fn resource_url_keeps_base_path_prefix() {
        let backend = RtdbBackend::new(RtdbSettings::new("http://127.0.0.1:9000/ns")).unwrap();
        let url = backend.resource_url(&["notes"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/ns/notes.json");
    }

    #[test]
    fn new_rejects_non_http_urls() {
        for bad in ["not a url", "ftp://example.com", "mailto:someone@example.com"] {
            let err = RtdbBackend::new(RtdbSettings::new(bad))
                .err()
                .expect("url should be rejected");
            assert!(matches!(err, StoreError::Misconfigured(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn decode_children_handles_null_and_objects() {
        assert!(decode_children(json!(null)).unwrap().is_empty());

        let mut children =
            decode_children(json!({"20240101_000001": "b", "20240101_000000": "a"})).unwrap();
        children.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(children[0].body, "a");
        assert_eq!(children[1].body, "b");
    }

    #[test]
    fn decode_children_skips_older_non_string_values() {
        let children =
            decode_children(json!({"20200101_000000": 42, "20240101_000001": "latest"})).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, "20240101_000001");
        assert_eq!(children[0].body, "latest");
    }

    #[test]
    fn decode_children_rejects_non_string_latest_value() {
        let err = decode_children(json!({"20240101_000000": 42})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        let err =
            decode_children(json!({"20200101_000000": "old", "20240101_000000": {"a": 1}}))
                .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        let err = decode_children(json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn status_mapping_distinguishes_permission_and_quota() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "x"),
            StoreError::Permission(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "x"),
            StoreError::Quota(_)
        ));
        assert!(matches!(
            map_status(StatusCode::PRECONDITION_FAILED, "x"),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, "x"),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn error_message_prefers_firebase_error_field() {
        assert_eq!(error_message(r#"{"error":"Permission denied"}"#), "Permission denied");
        assert_eq!(error_message("  plain  "), "plain");
        assert_eq!(error_message(""), "no error details");
    }
}
