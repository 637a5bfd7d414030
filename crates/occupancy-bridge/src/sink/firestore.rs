// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cloud Firestore backend over the REST API.
//!
//! Document values use the Firestore typed encoding:
//!
//! ```text
//! {"fields": {"count": {"integerValue": "3"},
//!             "light": {"stringValue": "ON"},
//!             "timestamp": {"timestampValue": "2026-03-14T09:26:53.000000Z"}, ...}}
//! ```
//!
//! Obtaining the OAuth access token is left to the caller; the store only
//! attaches it as a bearer token. Against the emulator no token is needed.
//!
//! See: <https://firebase.google.com/docs/firestore/reference/rest>

use super::{DocumentId, DocumentStore, StoreError};
use crate::reading::{Event, Payload};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

/// Production REST endpoint.
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Database id used when none is configured.
pub const DEFAULT_DATABASE: &str = "(default)";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`FirestoreStore`].
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    pub project_id: String,
    /// Firestore database id.
    pub database: String,
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// OAuth2 access token. `None` for the emulator.
    pub access_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl FirestoreConfig {
    /// Production Firestore for `project_id`.
    pub fn new(project_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            base_url: DEFAULT_FIRESTORE_URL.to_string(),
            access_token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Local emulator listening on `host` (e.g. `localhost:8080`).
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://{}/v1", host.trim_end_matches('/')),
            access_token: None,
            ..Self::new(project_id, None)
        }
    }

    /// `.../projects/{p}/databases/{db}/documents`
    pub fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database
        )
    }
}

/// [`DocumentStore`] backed by Cloud Firestore.
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    /// Build the HTTP client. Fails only if the TLS backend cannot start.
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.documents_root(),
            path.trim_matches('/')
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorized(request)
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    /// Fetch one document. A missing document is `Ok(None)`.
    pub fn get_document(&self, path: &str) -> Result<Option<Payload>, StoreError> {
        let response = self.send(self.client.get(self.url(path)))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = json_body(response)?;
        decode_document(&body).map(Some)
    }

    /// Newest `limit` documents of `collection`, ordered by `timestamp`
    /// descending.
    pub fn recent(
        &self,
        collection: &str,
        limit: u32,
    ) -> Result<Vec<(DocumentId, Payload)>, StoreError> {
        let collection = collection.trim_matches('/');
        let (parent, collection_id) = match collection.rsplit_once('/') {
            Some((parent, id)) => (Some(parent), id),
            None => (None, collection),
        };
        let url = match parent {
            Some(parent) => format!("{}:runQuery", self.url(parent)),
            None => format!("{}:runQuery", self.config.documents_root()),
        };

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection_id }],
                "orderBy": [{
                    "field": { "fieldPath": "timestamp" },
                    "direction": "DESCENDING"
                }],
                "limit": limit
            }
        });

        let response = self.send(self.client.post(url).json(&body))?;
        let rows = json_body(response)?;
        let rows = rows
            .as_array()
            .ok_or_else(|| StoreError::Malformed("runQuery did not return an array".into()))?;

        // Rows without a document only carry a read time.
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(|doc| {
                let id = document_id(doc)?;
                Ok((id, decode_document(doc)?))
            })
            .collect()
    }
}

impl DocumentStore for FirestoreStore {
    fn set_document(&self, path: &str, payload: &Payload) -> Result<(), StoreError> {
        // PATCH without an update mask replaces the whole document.
        let request = self
            .client
            .patch(self.url(path))
            .json(&encode_document(payload));
        json_body(self.send(request)?)?;
        Ok(())
    }

    fn append_document(
        &self,
        collection: &str,
        payload: &Payload,
    ) -> Result<DocumentId, StoreError> {
        let request = self
            .client
            .post(self.url(collection))
            .json(&encode_document(payload));
        let body = json_body(self.send(request)?)?;
        document_id(&body)
    }
}

/// Read a successful JSON body or turn the status into [`StoreError::Rejected`].
fn json_body(response: Response) -> Result<Value, StoreError> {
    let status = response.status();
    let text = response
        .text()
        .map_err(|e| StoreError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Firestore errors look like `{"error": {"code": 403, "message": "..."}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Last segment of the document `name`.
fn document_id(doc: &Value) -> Result<DocumentId, StoreError> {
    doc.get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Malformed("document has no name".into()))
}

/// Encode a payload as a Firestore document body.
pub(crate) fn encode_document(payload: &Payload) -> Value {
    json!({
        "fields": {
            "count": { "integerValue": payload.count.to_string() },
            "usage_s": { "integerValue": payload.usage_s.to_string() },
            "light": { "stringValue": payload.light },
            "timestamp": {
                "timestampValue": payload.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
            },
            "event": { "stringValue": payload.event.as_str() },
        }
    })
}

/// Decode a Firestore document body into a payload.
///
/// A missing or unknown `event` is derived from `count`.
pub(crate) fn decode_document(doc: &Value) -> Result<Payload, StoreError> {
    let fields = doc
        .get("fields")
        .ok_or_else(|| StoreError::Malformed("document has no fields".into()))?;

    let count = integer_field(fields, "count")?;
    let usage_s = integer_field(fields, "usage_s")?;
    let light = string_field(fields, "light")?.to_string();

    let raw_ts = fields["timestamp"]["timestampValue"]
        .as_str()
        .ok_or_else(|| missing("timestamp"))?;
    let timestamp = DateTime::parse_from_rfc3339(raw_ts)
        .map_err(|e| StoreError::Malformed(format!("timestamp {:?}: {}", raw_ts, e)))?
        .with_timezone(&Utc);

    let event = string_field(fields, "event")
        .ok()
        .and_then(Event::from_token)
        .unwrap_or_else(|| Event::from_count(count));

    Ok(Payload {
        count,
        usage_s,
        light,
        timestamp,
        event,
    })
}

fn missing(name: &str) -> StoreError {
    StoreError::Malformed(format!("field {} missing or mistyped", name))
}

fn integer_field(fields: &Value, name: &str) -> Result<u64, StoreError> {
    // REST returns int64 as a string, but accept a bare number too.
    match &fields[name]["integerValue"] {
        Value::String(s) => s.parse().map_err(|_| missing(name)),
        Value::Number(n) => n.as_u64().ok_or_else(|| missing(name)),
        _ => Err(missing(name)),
    }
}

fn string_field<'a>(fields: &'a Value, name: &str) -> Result<&'a str, StoreError> {
    fields[name]["stringValue"]
        .as_str()
        .ok_or_else(|| missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use chrono::TimeZone;

    fn sample_payload() -> Payload {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        Payload::stamp(&Reading::new(3, 120, "ON"), ts)
    }

    #[test]
    fn test_encode_document() {
        let body = encode_document(&sample_payload());
        let fields = &body["fields"];

        assert_eq!(fields["count"]["integerValue"], "3");
        assert_eq!(fields["usage_s"]["integerValue"], "120");
        assert_eq!(fields["light"]["stringValue"], "ON");
        assert_eq!(fields["event"]["stringValue"], "OCCUPIED");
        assert_eq!(
            fields["timestamp"]["timestampValue"],
            "2026-03-14T09:26:53.000000Z"
        );
    }

    #[test]
    fn test_decode_encoded_document() {
        let payload = sample_payload();
        let decoded = decode_document(&encode_document(&payload)).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_server_document() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/x/latest/history/AbC123",
            "fields": {
                "count": { "integerValue": "0" },
                "usage_s": { "integerValue": 45 },
                "light": { "stringValue": "OFF" },
                "timestamp": { "timestampValue": "2026-03-14T09:26:53.123456789Z" }
            },
            "createTime": "2026-03-14T09:26:53.200Z"
        });

        let payload = decode_document(&doc).expect("decode");
        assert_eq!(payload.count, 0);
        assert_eq!(payload.usage_s, 45);
        assert_eq!(payload.event, Event::Empty);
        assert_eq!(document_id(&doc).expect("id"), "AbC123");
    }

    #[test]
    fn test_decode_rejects_missing_count() {
        let doc = json!({ "fields": { "light": { "stringValue": "ON" } } });
        assert!(matches!(
            decode_document(&doc),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}}"#;
        assert_eq!(error_message(body), "Missing or insufficient permissions.");
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn test_documents_root() {
        let config = FirestoreConfig::new("demo-project", Some("t".into()));
        assert_eq!(
            config.documents_root(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents"
        );

        let emulator = FirestoreConfig::emulator("localhost:8080/", "demo-project");
        assert_eq!(
            emulator.documents_root(),
            "http://localhost:8080/v1/projects/demo-project/databases/(default)/documents"
        );
        assert!(emulator.access_token.is_none());
    }
}
