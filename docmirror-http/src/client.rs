use crate::wire;
use async_trait::async_trait;
use docmirror::{
    BulkAction, BulkOptions, BulkResponse, IndexEngine, IndexResponse, MirrorConfig, MirrorError,
    Result, SearchResults,
};
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for an Elasticsearch-style engine.
///
/// Status codes map onto [`MirrorError`]: 404 is `NotFound`, any other 4xx is
/// `Validation`, and 5xx or a failed connection is `Transport`.
#[derive(Clone)]
pub struct HttpIndexEngine {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpIndexEngine {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| MirrorError::Config(format!("Invalid engine URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(MirrorError::Config(format!(
                "Invalid engine URL {}: not a base URL",
                base_url
            )));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        Self::new(&config.base_url())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn url(&self, segments: &[&str], refresh: bool) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if refresh {
            url.query_pairs_mut().append_pair("refresh", "true");
        }
        url
    }

    /// Send and decode the JSON body. An empty body decodes to `null`.
    async fn send(&self, what: &str, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| MirrorError::Transport(format!("{} failed: {}", what, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MirrorError::Transport(format!("{}: failed to read body: {}", what, e)))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(v) => v,
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => {
                    return Err(MirrorError::Json(format!(
                        "{}: unparseable response: {}",
                        what, e
                    )))
                }
            }
        };

        if status.is_success() {
            return Ok(body);
        }
        Err(status_error(what, status, &body))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        tracing::debug!("[ENGINE] {} {}", method, url);
        self.http_client.request(method, url)
    }
}

fn status_error(what: &str, status: StatusCode, body: &Value) -> MirrorError {
    let reason = match body.get("error") {
        Some(error) => wire::error_reason(error),
        None if body.is_null() => status.to_string(),
        None => body.to_string(),
    };
    let message = format!("{} returned {}: {}", what, status.as_u16(), reason);
    if status == StatusCode::NOT_FOUND {
        MirrorError::NotFound(message)
    } else if status.is_client_error() {
        MirrorError::Validation(message)
    } else {
        MirrorError::Transport(message)
    }
}

#[async_trait]
impl IndexEngine for HttpIndexEngine {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let request = self.request(Method::HEAD, self.url(&[index], false));
        match self.send(&format!("HEAD {}", index), request).await {
            Ok(_) => Ok(true),
            Err(MirrorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<Value> {
        let request = self.request(Method::PUT, self.url(&[index], false)).json(body);
        self.send(&format!("create index {}", index), request).await
    }

    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &Value) -> Result<Value> {
        let url = self.url(&[index, type_name, "_mapping"], false);
        let request = self.request(Method::PUT, url).json(mapping);
        self.send(&format!("put mapping {}/{}", index, type_name), request)
            .await
    }

    async fn delete_index(&self, index: &str) -> Result<Value> {
        let request = self.request(Method::DELETE, self.url(&[index], false));
        self.send(&format!("delete index {}", index), request).await
    }

    async fn index(
        &self,
        index: &str,
        type_name: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<IndexResponse> {
        let url = self.url(&[index, type_name, id], refresh);
        let request = self.request(Method::PUT, url).json(document);
        let body = self
            .send(&format!("index {}/{}/{}", index, type_name, id), request)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn delete(&self, index: &str, type_name: &str, id: &str) -> Result<Value> {
        let request = self.request(Method::DELETE, self.url(&[index, type_name, id], false));
        self.send(&format!("delete {}/{}/{}", index, type_name, id), request)
            .await
    }

    async fn bulk(&self, actions: &[BulkAction], options: BulkOptions) -> Result<BulkResponse> {
        if actions.is_empty() {
            return Ok(BulkResponse::default());
        }
        let body = wire::encode_bulk(actions)?;
        let request = self
            .request(Method::POST, self.url(&["_bulk"], options.refresh))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = self
            .send(&format!("bulk of {}", actions.len()), request)
            .await?;
        wire::decode_bulk(response)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResults> {
        let request = self
            .request(Method::POST, self.url(&[index, "_search"], false))
            .json(body);
        let response = self.send(&format!("search {}", index), request).await?;
        wire::decode_search(response)
    }

    async fn count(&self, index: &str, type_name: &str, query: Option<&Value>) -> Result<u64> {
        let mut request = self.request(Method::POST, self.url(&[index, type_name, "_count"], false));
        if let Some(query) = query {
            request = request.json(&json!({ "query": query }));
        }
        let response = self
            .send(&format!("count {}/{}", index, type_name), request)
            .await?;
        wire::decode_count(response)
    }

    async fn put_river(&self, river_type: &str, name: &str, config: &Value) -> Result<Value> {
        let request = self
            .request(Method::PUT, self.url(&["_river", name, "_meta"], false))
            .json(config);
        self.send(&format!("register {} river {}", river_type, name), request)
            .await
    }
}
