//! Pebble HTTP API client
//!
//! In a sidecar pod Pebble listens on a unix socket shared with the operator
//! container, addressed as `unix:///charm/containers/<name>/pebble.socket`. An
//! `http://` base URL is accepted as well.

use async_trait::async_trait;
use http::{header, Method, Request};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::debug;
use url::Url;

use super::{Layer, PebbleError, Plan, ServiceInfo, Supervisor};
use crate::config::PebbleConfig;

/// Requests over the socket still need an absolute URL to build paths from
const SOCKET_BASE: &str = "http://localhost/";
/// Response envelope shared by every Pebble endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(rename = "status-code", default)]
    status_code: u16,

    #[serde(default)]
    result: Value,

    /// Set on `async` responses
    #[serde(default)]
    change: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Change {
    id: String,
    #[serde(default)]
    err: Option<String>,
}

/// How requests reach the API
enum Transport {
    Http(Client),
    Unix(PathBuf),
}

/// Pebble API client
pub struct PebbleClient {
    transport: Transport,
    base: Url,
    timeout: Duration,
    change_timeout: Duration,
}

impl PebbleClient {
    pub fn new(config: &PebbleConfig) -> Result<Self, PebbleError> {
        let url = Url::parse(&config.url)
            .map_err(|e| PebbleError::Connection(format!("invalid Pebble URL {}: {}", config.url, e)))?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let (transport, base) = match url.scheme() {
            "unix" => {
                let base = Url::parse(SOCKET_BASE)
                    .map_err(|e| PebbleError::Connection(format!("invalid socket base: {}", e)))?;
                (Transport::Unix(PathBuf::from(url.path())), base)
            }
            "http" | "https" => {
                let http = Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| PebbleError::Connection(format!("failed to build HTTP client: {}", e)))?;
                (Transport::Http(http), url)
            }
            other => {
                return Err(PebbleError::Connection(format!(
                    "unsupported Pebble URL scheme {}",
                    other
                )))
            }
        };

        Ok(Self {
            transport,
            base,
            timeout,
            change_timeout: Duration::from_secs(config.change_timeout_secs),
        })
    }

    /// Socket the client connects to, `None` over plain HTTP
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.transport {
            Transport::Unix(path) => Some(path),
            Transport::Http(_) => None,
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, PebbleError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| PebbleError::Connection(format!("invalid endpoint {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Envelope, PebbleError> {
        let (status, text) = match &self.transport {
            Transport::Http(http) => {
                let mut request = http.request(method, url).timeout(timeout);
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| PebbleError::Connection(e.to_string()))?;
                let status = response.status().as_u16();
                let text = response
                    .text()
                    .await
                    .map_err(|e| PebbleError::Connection(e.to_string()))?;
                (status, text)
            }
            Transport::Unix(socket) => {
                tokio::time::timeout(timeout, socket_request(socket, method, &url, body))
                    .await
                    .map_err(|_| {
                        PebbleError::Connection(format!(
                            "no answer on {} within {:?}",
                            socket.display(),
                            timeout
                        ))
                    })??
            }
        };

        parse_envelope(status, text)
    }

    async fn service_action(&self, action: &str, name: &str) -> Result<(), PebbleError> {
        let url = self.endpoint("v1/services", &[])?;
        let body = json!({ "action": action, "services": [name] });
        let envelope = self.send(Method::POST, url, Some(&body), self.timeout).await?;

        let change = envelope.change.ok_or_else(|| {
            PebbleError::Decode(format!("{} response for {} carried no change id", action, name))
        })?;
        debug!("Waiting for Pebble change {} ({} {})", change, action, name);
        self.wait_change(&change).await
    }

    async fn wait_change(&self, change: &str) -> Result<(), PebbleError> {
        let timeout = format!("{}s", self.change_timeout.as_secs());
        let url = self.endpoint(
            &format!("v1/changes/{}/wait", change),
            &[("timeout", timeout.as_str())],
        )?;

        let envelope = self
            .send(Method::GET, url, None, self.change_timeout + Duration::from_secs(5))
            .await?;
        let change: Change =
            serde_json::from_value(envelope.result).map_err(|e| PebbleError::Decode(e.to_string()))?;

        match change.err {
            Some(message) => Err(PebbleError::ChangeFailed {
                change: change.id,
                message,
            }),
            None => Ok(()),
        }
    }
}

/// One request over a fresh connection to the socket
async fn socket_request(
    socket: &Path,
    method: Method,
    url: &Url,
    body: Option<&Value>,
) -> Result<(u16, String), PebbleError> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| PebbleError::Connection(format!("{}: {}", socket.display(), e)))?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| PebbleError::Connection(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("Pebble connection closed: {}", e);
        }
    });

    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let mut request = Request::builder()
        .method(method)
        .uri(target)
        .header(header::HOST, "localhost");
    let payload = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Bytes::from(serde_json::to_vec(body).map_err(|e| PebbleError::Decode(e.to_string()))?)
        }
        None => Bytes::new(),
    };
    let request = request
        .body(Full::new(payload))
        .map_err(|e| PebbleError::Connection(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| PebbleError::Connection(e.to_string()))?;
    let status = response.status().as_u16();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| PebbleError::Connection(e.to_string()))?
        .to_bytes();

    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}

fn parse_envelope(status: u16, body: String) -> Result<Envelope, PebbleError> {
    let envelope: Envelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !(200..300).contains(&status) => {
            return Err(PebbleError::Api {
                code: status,
                message: body,
            })
        }
        Err(e) => return Err(PebbleError::Decode(e.to_string())),
    };

    if envelope.kind == "error" {
        let message = envelope
            .result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let code = match envelope.status_code {
            0 => status,
            code => code,
        };
        return Err(PebbleError::Api { code, message });
    }

    Ok(envelope)
}

#[async_trait]
impl Supervisor for PebbleClient {
    async fn get_plan(&self) -> Result<Plan, PebbleError> {
        let url = self.endpoint("v1/plan", &[("format", "yaml")])?;
        let envelope = self.send(Method::GET, url, None, self.timeout).await?;
        let raw = envelope
            .result
            .as_str()
            .ok_or_else(|| PebbleError::Decode("plan result is not a YAML string".to_string()))?;
        Plan::from_yaml(raw)
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), PebbleError> {
        let url = self.endpoint("v1/layers", &[])?;
        let body = json!({
            "action": "add",
            "combine": combine,
            "label": label,
            "format": "yaml",
            "layer": layer.to_yaml()?,
        });
        self.send(Method::POST, url, Some(&body), self.timeout).await?;
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<ServiceInfo, PebbleError> {
        let url = self.endpoint("v1/services", &[("names", name)])?;
        let envelope = self.send(Method::GET, url, None, self.timeout).await?;
        let services: Vec<ServiceInfo> =
            serde_json::from_value(envelope.result).map_err(|e| PebbleError::Decode(e.to_string()))?;

        services
            .into_iter()
            .find(|service| service.name == name)
            .ok_or_else(|| PebbleError::ServiceNotFound(name.to_string()))
    }

    async fn stop(&self, name: &str) -> Result<(), PebbleError> {
        self.service_action("stop", name).await
    }

    async fn start(&self, name: &str) -> Result<(), PebbleError> {
        self.service_action("start", name).await
    }
}
