use serde::Serialize;
use url::Url;

pub const SCHEME: &str = "vless";
pub const SCHEME_PREFIX: &str = "vless://";
pub const DEFAULT_PORT: u16 = 443;

/// One subscription entry, either extracted from a structured outbound or
/// carried through verbatim from a literal `vless://` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEntry {
    Outbound(OutboundConfig),
    RawUri(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundConfig {
    pub tag: Option<String>,
    pub identity: String,
    pub address: String,
    pub port: u16,
    pub transport: Transport,
    pub security: Security,
    pub flow: Option<String>,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            tag: None,
            identity: String::new(),
            address: String::new(),
            port: DEFAULT_PORT,
            transport: Transport::default(),
            security: Security::default(),
            flow: None,
        }
    }
}

/// Stream framing together with the parameters that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp { header_type: Option<String> },
    Ws { path: Option<String>, host: Option<String> },
    Grpc { service_name: Option<String> },
    H2 { path: Option<String>, hosts: Vec<String> },
    Http { path: Option<String>, hosts: Vec<String> },
    Other(String),
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Tcp { header_type: None }
    }
}

impl Transport {
    pub fn name(&self) -> &str {
        match self {
            Transport::Tcp { .. } => "tcp",
            Transport::Ws { .. } => "ws",
            Transport::Grpc { .. } => "grpc",
            Transport::H2 { .. } => "h2",
            Transport::Http { .. } => "http",
            Transport::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Security {
    #[default]
    None,
    Tls(TlsParams),
    Reality(RealityParams),
    Other(String),
}

impl Security {
    pub fn name(&self) -> &str {
        match self {
            Security::None => "none",
            Security::Tls(_) => "tls",
            Security::Reality(_) => "reality",
            Security::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsParams {
    pub server_name: Option<String>,
    pub alpn: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealityParams {
    pub server_name: Option<String>,
    pub public_key: Option<String>,
    pub short_id: Option<String>,
    pub fingerprint: Option<String>,
    pub alpn: Vec<String>,
}

/// Connection facts shown next to each converted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub address: String,
    pub port: Option<u16>,
    pub transport: String,
    pub security: String,
}

impl ConfigEntry {
    pub fn tag(&self) -> Option<String> {
        match self {
            ConfigEntry::Outbound(outbound) => outbound.tag.clone(),
            ConfigEntry::RawUri(raw) => Url::parse(raw)
                .ok()
                .and_then(|url| url.fragment().map(decode_fragment)),
        }
    }

    pub fn address(&self) -> Option<String> {
        match self {
            ConfigEntry::Outbound(outbound) => Some(outbound.address.clone()),
            ConfigEntry::RawUri(raw) => Url::parse(raw)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string)),
        }
    }

    pub fn summary(&self) -> EntrySummary {
        match self {
            ConfigEntry::Outbound(outbound) => EntrySummary {
                address: outbound.address.clone(),
                port: Some(outbound.port),
                transport: outbound.transport.name().to_string(),
                security: outbound.security.name().to_string(),
            },
            ConfigEntry::RawUri(raw) => summarize_raw(raw),
        }
    }
}

fn summarize_raw(raw: &str) -> EntrySummary {
    let mut summary = EntrySummary {
        address: "N/A".to_string(),
        port: None,
        transport: "tcp".to_string(),
        security: "none".to_string(),
    };
    let Ok(url) = Url::parse(raw) else {
        return summary;
    };
    if let Some(host) = url.host_str() {
        summary.address = host.to_string();
    }
    summary.port = url.port();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "type" if !value.is_empty() => summary.transport = value.to_string(),
            "security" if !value.is_empty() => summary.security = value.to_string(),
            _ => {}
        }
    }
    summary
}

fn decode_fragment(fragment: &str) -> String {
    urlencoding::decode(fragment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| fragment.to_string())
}
