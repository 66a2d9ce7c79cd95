use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::entry::{
    ConfigEntry, OutboundConfig, RealityParams, Security, TlsParams, Transport, DEFAULT_PORT,
    SCHEME, SCHEME_PREFIX,
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse config: `outbounds` of document {document} is not an array")]
    OutboundsNotArray { document: usize },
    #[error("failed to parse config: outbound {position}: {reason}")]
    InvalidOutbound { position: usize, reason: String },
}

/// The two grammars a subscription body can follow.
#[derive(Debug)]
pub enum SubscriptionDocument<'a> {
    Structured(Value),
    Lines(&'a str),
}

impl<'a> SubscriptionDocument<'a> {
    pub fn detect(text: &'a str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => SubscriptionDocument::Structured(value),
            Err(_) => SubscriptionDocument::Lines(text),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            SubscriptionDocument::Structured(Value::Array(_)) => "json-array",
            SubscriptionDocument::Structured(Value::Object(_)) => "json-object",
            SubscriptionDocument::Structured(_) => "json-scalar",
            SubscriptionDocument::Lines(_) => "uri-lines",
        }
    }

    pub fn entries(&self) -> Result<Vec<ConfigEntry>, ParseError> {
        match self {
            SubscriptionDocument::Structured(value) => structured_entries(value),
            SubscriptionDocument::Lines(text) => Ok(line_entries(text)),
        }
    }
}

/// Extracts VLESS entries from a subscription body, in source order.
///
/// An empty result means nothing matched; it is not an error.
pub fn parse_subscription(text: &str) -> Result<Vec<ConfigEntry>, ParseError> {
    let document = SubscriptionDocument::detect(text);
    let entries = document.entries()?;
    debug!(
        shape = document.shape(),
        entries = entries.len(),
        "subscription parsed"
    );
    Ok(entries)
}

fn line_entries(text: &str) -> Vec<ConfigEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(SCHEME_PREFIX))
        .map(|line| ConfigEntry::RawUri(line.to_string()))
        .collect()
}

fn structured_entries(value: &Value) -> Result<Vec<ConfigEntry>, ParseError> {
    let documents: Vec<&Value> = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items.iter().collect(),
        _ => return Ok(Vec::new()),
    };

    let mut entries = Vec::new();
    for (idx, document) in documents.into_iter().enumerate() {
        let Value::Object(fields) = document else {
            continue;
        };
        let candidates: Vec<&Value> = match fields.get("outbounds") {
            Some(Value::Array(items)) if !items.is_empty() => items.iter().collect(),
            None | Some(Value::Null) | Some(Value::Array(_)) => {
                if fields.contains_key("protocol") {
                    vec![document]
                } else {
                    Vec::new()
                }
            }
            Some(_) => return Err(ParseError::OutboundsNotArray { document: idx + 1 }),
        };

        for candidate in candidates {
            if !is_vless(candidate) {
                continue;
            }
            let position = entries.len() + 1;
            let outbound = extract_outbound(candidate)
                .map_err(|reason| ParseError::InvalidOutbound { position, reason })?;
            entries.push(ConfigEntry::Outbound(outbound));
        }
    }
    Ok(entries)
}

fn is_vless(candidate: &Value) -> bool {
    candidate.get("protocol").and_then(Value::as_str) == Some(SCHEME)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutbound {
    tag: Option<String>,
    settings: Option<RawSettings>,
    #[serde(rename = "streamSettings")]
    stream_settings: Option<RawStream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    vnext: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    address: Option<String>,
    port: Option<RawPort>,
    users: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    id: Option<String>,
    uuid: Option<String>,
    flow: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStream {
    network: Option<String>,
    security: Option<String>,
    #[serde(rename = "tlsSettings")]
    tls_settings: Option<Value>,
    #[serde(rename = "realitySettings")]
    reality_settings: Option<Value>,
    #[serde(rename = "wsSettings")]
    ws_settings: Option<Value>,
    #[serde(rename = "grpcSettings")]
    grpc_settings: Option<Value>,
    #[serde(rename = "tcpSettings")]
    tcp_settings: Option<Value>,
    #[serde(rename = "tcSettings")]
    legacy_tcp_settings: Option<Value>,
    #[serde(rename = "httpSettings")]
    http_settings: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSecurity {
    #[serde(rename = "serverName")]
    server_name: Option<String>,
    #[serde(rename = "publicKey")]
    public_key: Option<String>,
    #[serde(rename = "shortId")]
    short_id: Option<String>,
    fingerprint: Option<String>,
    alpn: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWs {
    path: Option<String>,
    host: Option<String>,
    headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGrpc {
    #[serde(rename = "serviceName")]
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTcp {
    header: Option<RawTcpHeader>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTcpHeader {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttp {
    path: Option<String>,
    host: Option<RawHosts>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHosts {
    Many(Vec<String>),
    One(String),
}

fn extract_outbound(candidate: &Value) -> Result<OutboundConfig, String> {
    let raw: RawOutbound = decode(Some(candidate))?;
    let server: RawServer = first_of(raw.settings.and_then(|s| s.vnext), "vnext")?;
    let user: RawUser = first_of(server.users, "users")?;
    let stream = raw.stream_settings.unwrap_or_default();

    let port = match server.port {
        None => DEFAULT_PORT,
        Some(RawPort::Number(n)) => {
            u16::try_from(n).map_err(|_| format!("port {} is out of range", n))?
        }
        Some(RawPort::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("invalid port: {}", text))?,
    };

    Ok(OutboundConfig {
        tag: raw.tag,
        identity: user.id.or(user.uuid).unwrap_or_default(),
        address: server.address.unwrap_or_default(),
        port,
        transport: extract_transport(&stream)?,
        security: extract_security(&stream)?,
        flow: non_empty(user.flow),
    })
}

fn extract_transport(stream: &RawStream) -> Result<Transport, String> {
    let network = non_empty(stream.network.clone()).unwrap_or_else(|| "tcp".to_string());
    let transport = match network.as_str() {
        "tcp" => {
            let settings = stream
                .tcp_settings
                .as_ref()
                .or(stream.legacy_tcp_settings.as_ref());
            let tcp: RawTcp = decode(settings)?;
            Transport::Tcp {
                header_type: non_empty(tcp.header.and_then(|h| h.kind)),
            }
        }
        "ws" => {
            let ws: RawWs = decode(stream.ws_settings.as_ref())?;
            let header_host = ws.headers.and_then(|headers| {
                headers
                    .get("Host")
                    .or_else(|| headers.get("host"))
                    .cloned()
            });
            Transport::Ws {
                path: non_empty(ws.path),
                host: non_empty(header_host.or(ws.host)),
            }
        }
        "grpc" => {
            let grpc: RawGrpc = decode(stream.grpc_settings.as_ref())?;
            Transport::Grpc {
                service_name: non_empty(grpc.service_name),
            }
        }
        "h2" | "http" => {
            let http: RawHttp = decode(stream.http_settings.as_ref())?;
            let hosts = match http.host {
                Some(RawHosts::Many(hosts)) => hosts,
                Some(RawHosts::One(host)) => vec![host],
                None => Vec::new(),
            };
            let hosts: Vec<String> = hosts.into_iter().filter(|h| !h.is_empty()).collect();
            let path = non_empty(http.path);
            if network == "h2" {
                Transport::H2 { path, hosts }
            } else {
                Transport::Http { path, hosts }
            }
        }
        _ => Transport::Other(network),
    };
    Ok(transport)
}

fn extract_security(stream: &RawStream) -> Result<Security, String> {
    let security = non_empty(stream.security.clone()).unwrap_or_else(|| "none".to_string());
    let tls = stream.tls_settings.as_ref();
    let reality = stream.reality_settings.as_ref();
    let parsed = match security.as_str() {
        "none" => Security::None,
        "tls" => {
            let raw: RawSecurity = decode(tls.or(reality))?;
            Security::Tls(TlsParams {
                server_name: non_empty(raw.server_name),
                alpn: raw.alpn.unwrap_or_default(),
            })
        }
        "reality" => {
            let raw: RawSecurity = decode(reality.or(tls))?;
            Security::Reality(RealityParams {
                server_name: non_empty(raw.server_name),
                public_key: non_empty(raw.public_key),
                short_id: non_empty(raw.short_id),
                fingerprint: non_empty(raw.fingerprint),
                alpn: raw.alpn.unwrap_or_default(),
            })
        }
        _ => Security::Other(security),
    };
    Ok(parsed)
}

fn decode<T: DeserializeOwned + Default>(value: Option<&Value>) -> Result<T, String> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|e| e.to_string()),
    }
}

/// Only the first element of an endpoint or user list is read; an empty or
/// missing list behaves like an empty object.
fn first_of<T: DeserializeOwned + Default>(
    list: Option<Vec<Value>>,
    field: &str,
) -> Result<T, String> {
    let first = list.and_then(|items| items.into_iter().next());
    decode(first.as_ref()).map_err(|e| format!("{}: {}", field, e))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
