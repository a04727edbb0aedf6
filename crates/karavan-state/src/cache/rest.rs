//! [`RemoteCacheManager`] over the cache server's REST API (HTTP/1.1).
//!
//! Endpoints used:
//!
//! ```text
//! PUT    /rest/v2/schemas/karavan.proto             register message types
//! HEAD   /rest/v2/caches/{cache}                    exists?
//! POST   /rest/v2/caches/{cache}                    create from XML definition
//! GET    /rest/v2/caches/{cache}/{key}              point lookup
//! PUT    /rest/v2/caches/{cache}/{key}              upsert
//! POST   /rest/v2/caches/{cache}/{key}              insert if absent (409 if present)
//! DELETE /rest/v2/caches/{cache}/{key}              remove
//! POST   /rest/v2/caches/{cache}?action=clear       clear
//! GET    /rest/v2/caches/{cache}?action=entries     all entries
//! GET    /rest/v2/caches/{cache}?action=search      indexed query
//! GET    /rest/v2/cache-managers/default/health/status
//! ```
//!
//! Caches store protostream, so every JSON document crossing the wire names
//! its message type in `_type`. Grouped keys are tagged here; plain strings
//! travel as `{"_type":"string","_value":...}` wrappers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cache::remote::{RemoteCacheManager, RemoteKey, TYPE_FIELD};
use crate::catalog::{PROTO_SCHEMA, PROTO_SCHEMA_NAME};
use crate::error::{StateError, StateResult};
use crate::query::ParsedQuery;

const KEY_CONTENT_TYPE: &str = "Key-Content-Type";
const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=UTF-8";

/// Protostream wrapper for scalar strings.
const STRING_TYPE: &str = "string";
const VALUE_FIELD: &str = "_value";

/// Decoded HTTP response.
struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

impl Reply {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct RestCacheManager {
    client: Client<HttpConnector, Full<Bytes>>,
    base: String,
    authorization: Option<String>,
    timeout: Duration,
    schema: OnceCell<()>,
}

impl RestCacheManager {
    /// Build a client for `url` (e.g. `http://infinispan:11222`). No request
    /// is made until the first operation.
    pub fn new(
        url: &str,
        username: Option<&str>,
        password: Option<&str>,
        timeout: Duration,
    ) -> StateResult<Self> {
        let base = url.trim_end_matches('/').to_string();
        let uri: Uri = base
            .parse()
            .map_err(|e| StateError::Transport(format!("invalid url {url}: {e}")))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(StateError::Transport(format!(
                "unsupported url {url}: expected http://host:port"
            )));
        }
        let authorization = username.map(|user| {
            let credentials = format!("{user}:{}", password.unwrap_or_default());
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(credentials)
            )
        });
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            client,
            base,
            authorization,
            timeout,
            schema: OnceCell::new(),
        })
    }

    fn cache_path(cache: &str) -> String {
        format!("/rest/v2/caches/{}", urlencoding::encode(cache))
    }

    fn key_path(cache: &str, key: &RemoteKey) -> StateResult<String> {
        Ok(format!(
            "{}/{}",
            Self::cache_path(cache),
            urlencoding::encode(&wire_key(key)?)
        ))
    }

    /// Register the message schema once per client. A failed attempt is
    /// retried by the next caller.
    async fn ensure_schema(&self) -> StateResult<()> {
        self.schema
            .get_or_try_init(|| async {
                let path = format!("/rest/v2/schemas/{PROTO_SCHEMA_NAME}");
                let body = Bytes::from_static(PROTO_SCHEMA.as_bytes());
                let reply = self
                    .send(Method::PUT, &path, None, Some((TEXT, body)))
                    .await?;
                if !reply.status.is_success() {
                    return Err(Self::unexpected("schema", PROTO_SCHEMA_NAME, &reply));
                }
                if let Some(error) = schema_error(&reply.body) {
                    return Err(StateError::Provisioning {
                        cache: PROTO_SCHEMA_NAME.to_string(),
                        reason: error,
                    });
                }
                info!(schema = PROTO_SCHEMA_NAME, "protobuf schema registered");
                Ok::<(), StateError>(())
            })
            .await
            .map(|_| ())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        key: Option<&RemoteKey>,
        body: Option<(&str, Bytes)>,
    ) -> StateResult<Reply> {
        let uri = format!("{}{}", self.base, path);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(header::ACCEPT, "application/json, text/plain")
            .header(header::USER_AGENT, "karavan-state/0.1");
        if let Some(auth) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        if let Some(key) = key {
            builder = builder.header(KEY_CONTENT_TYPE, if key.is_json() { JSON } else { TEXT });
        }
        let payload = match body {
            Some((content_type, bytes)) => {
                builder = builder.header(header::CONTENT_TYPE, content_type);
                bytes
            }
            None => Bytes::new(),
        };
        let req = builder
            .body(Full::new(payload))
            .map_err(|e| StateError::Transport(e.to_string()))?;

        let exchange = async {
            let resp: http::Response<Incoming> = self
                .client
                .request(req)
                .await
                .map_err(|e| StateError::Transport(format!("{method} {uri}: {e}")))?;
            let status = resp.status();
            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| StateError::Transport(format!("{method} {uri}: {e}")))?
                .to_bytes();
            debug!(%method, %uri, %status, "cache server replied");
            Ok(Reply {
                status,
                content_type,
                body,
            })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| StateError::Transport(format!("{method} {uri}: timed out")))?
    }

    fn unexpected(op: &str, cache: &str, reply: &Reply) -> StateError {
        StateError::Transport(format!(
            "{op} on '{cache}' returned {}: {}",
            reply.status,
            reply.body_text()
        ))
    }
}

/// The key as sent in the URL: JSON keys carry their message type.
fn wire_key(key: &RemoteKey) -> StateResult<String> {
    let Some(type_name) = key.type_name else {
        return Ok(key.encoded.clone());
    };
    let mut doc: Value =
        serde_json::from_str(&key.encoded).map_err(|e| StateError::Serialize(e.to_string()))?;
    let Value::Object(map) = &mut doc else {
        return Err(StateError::Serialize(format!(
            "key {} is not a JSON object",
            key.encoded
        )));
    };
    map.insert(TYPE_FIELD.to_string(), Value::String(type_name.to_string()));
    Ok(doc.to_string())
}

/// Encode a value for the wire. Documents already carry `_type`; bare
/// strings are wrapped.
fn encode_value(value: &Value) -> StateResult<(&'static str, Bytes)> {
    let wrapped;
    let doc = match value {
        Value::String(s) => {
            wrapped = serde_json::json!({ TYPE_FIELD: STRING_TYPE, VALUE_FIELD: s });
            &wrapped
        }
        other => other,
    };
    let bytes = serde_json::to_vec(doc).map_err(|e| StateError::Serialize(e.to_string()))?;
    Ok((JSON, Bytes::from(bytes)))
}

/// Decode a value according to the response content type.
fn decode_value(content_type: Option<&str>, body: &[u8]) -> StateResult<Value> {
    let is_json = content_type.is_some_and(|ct| ct.starts_with(JSON));
    if is_json {
        serde_json::from_slice(body)
            .map(unwrap_scalar)
            .map_err(|e| StateError::Deserialize(e.to_string()))
    } else {
        Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
    }
}

/// Replace a `{"_type":"string","_value":...}` wrapper by its value.
fn unwrap_scalar(mut value: Value) -> Value {
    let is_scalar = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|t| t == STRING_TYPE);
    if is_scalar {
        if let Some(inner) = value.get_mut(VALUE_FIELD) {
            return inner.take();
        }
    }
    value
}

/// `?action=entries` returns `[{"key": ..., "value": ...}, ...]`.
fn parse_entries(body: &[u8]) -> StateResult<Vec<Value>> {
    let entries: Vec<Value> =
        serde_json::from_slice(body).map_err(|e| StateError::Deserialize(e.to_string()))?;
    Ok(entries
        .into_iter()
        .filter_map(|mut entry| entry.get_mut("value").map(Value::take))
        .map(unwrap_scalar)
        .collect())
}

/// Schema upload replies carry `{"error": {"message": ...}}` when the
/// server accepted the file but could not parse it.
fn schema_error(body: &[u8]) -> Option<String> {
    let reply: Value = serde_json::from_slice(body).ok()?;
    match reply.get("error")? {
        Value::Null => None,
        error => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string),
        ),
    }
}

/// `?action=search` returns `{"hit_count": n, "hits": [{"hit": {...}}, ...]}`.
fn parse_search_hits(body: &[u8]) -> StateResult<Vec<Value>> {
    let mut reply: Value =
        serde_json::from_slice(body).map_err(|e| StateError::Deserialize(e.to_string()))?;
    let hits = match reply.get_mut("hits").map(Value::take) {
        Some(Value::Array(hits)) => hits,
        _ => return Err(StateError::Query("search reply has no hits array".to_string())),
    };
    Ok(hits
        .into_iter()
        .filter_map(|mut h| h.get_mut("hit").map(Value::take))
        .collect())
}

fn health_is_started(status: &str) -> bool {
    matches!(status.trim(), "HEALTHY" | "HEALTHY_REBALANCING")
}

#[async_trait]
impl RemoteCacheManager for RestCacheManager {
    async fn get_or_create_cache(&self, cache: &str, definition: &str) -> StateResult<()> {
        self.ensure_schema().await?;
        let path = Self::cache_path(cache);
        let existing = self.send(Method::HEAD, &path, None, None).await?;
        if existing.status.is_success() {
            return Ok(());
        }
        if existing.status != StatusCode::NOT_FOUND {
            return Err(Self::unexpected("HEAD", cache, &existing));
        }
        let body = Bytes::from(definition.to_string());
        let reply = self
            .send(Method::POST, &path, None, Some(("application/xml", body)))
            .await?;
        // Another node may have created it between the HEAD and the POST.
        if reply.status.is_success() || reply.status == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(Self::unexpected("create", cache, &reply))
        }
    }

    async fn is_started(&self) -> bool {
        match self
            .send(Method::GET, "/rest/v2/cache-managers/default/health/status", None, None)
            .await
        {
            Ok(reply) if reply.status.is_success() => health_is_started(&reply.body_text()),
            Ok(reply) => {
                warn!(status = %reply.status, "cache manager health check rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "cache manager health check failed");
                false
            }
        }
    }

    async fn get(&self, cache: &str, key: &RemoteKey) -> StateResult<Option<Value>> {
        let reply = self
            .send(Method::GET, &Self::key_path(cache, key)?, Some(key), None)
            .await?;
        match reply.status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                decode_value(reply.content_type.as_deref(), &reply.body).map(Some)
            }
            _ => Err(Self::unexpected("GET", cache, &reply)),
        }
    }

    async fn put(&self, cache: &str, key: &RemoteKey, value: &Value) -> StateResult<()> {
        let body = encode_value(value)?;
        let reply = self
            .send(Method::PUT, &Self::key_path(cache, key)?, Some(key), Some(body))
            .await?;
        if reply.status.is_success() {
            Ok(())
        } else {
            Err(Self::unexpected("PUT", cache, &reply))
        }
    }

    async fn put_if_absent(
        &self,
        cache: &str,
        key: &RemoteKey,
        value: &Value,
    ) -> StateResult<bool> {
        let body = encode_value(value)?;
        let reply = self
            .send(Method::POST, &Self::key_path(cache, key)?, Some(key), Some(body))
            .await?;
        match reply.status {
            StatusCode::CONFLICT => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(Self::unexpected("POST", cache, &reply)),
        }
    }

    async fn remove(&self, cache: &str, key: &RemoteKey) -> StateResult<()> {
        let reply = self
            .send(Method::DELETE, &Self::key_path(cache, key)?, Some(key), None)
            .await?;
        if reply.status.is_success() || reply.status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::unexpected("DELETE", cache, &reply))
        }
    }

    async fn clear(&self, cache: &str) -> StateResult<()> {
        let path = format!("{}?action=clear", Self::cache_path(cache));
        let reply = self.send(Method::POST, &path, None, None).await?;
        if reply.status.is_success() {
            Ok(())
        } else {
            Err(Self::unexpected("clear", cache, &reply))
        }
    }

    async fn values(&self, cache: &str) -> StateResult<Vec<Value>> {
        let path = format!(
            "{}?action=entries&content-negotiation=true&limit=-1",
            Self::cache_path(cache)
        );
        let reply = self.send(Method::GET, &path, None, None).await?;
        if !reply.status.is_success() {
            return Err(Self::unexpected("entries", cache, &reply));
        }
        parse_entries(&reply.body)
    }

    async fn query(
        &self,
        cache: &str,
        query: &str,
        params: &BTreeMap<String, String>,
    ) -> StateResult<Vec<Value>> {
        // The REST search endpoint has no parameter binding; inline them.
        let inline = ParsedQuery::parse(query)?.render_inline(params)?;
        let path = format!(
            "{}?action=search&max_results=-1&query={}",
            Self::cache_path(cache),
            urlencoding::encode(&inline)
        );
        let reply = self.send(Method::GET, &path, None, None).await?;
        match reply.status {
            s if s.is_success() => parse_search_hits(&reply.body),
            StatusCode::BAD_REQUEST => Err(StateError::Query(reply.body_text())),
            _ => Err(Self::unexpected("search", cache, &reply)),
        }
    }
}
