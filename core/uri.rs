use thiserror::Error;
use urlencoding::encode;

use crate::entry::{ConfigEntry, OutboundConfig, Security, Transport, SCHEME_PREFIX};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing user id")]
    MissingIdentity,
    #[error("missing server address")]
    MissingAddress,
}

/// Renders an entry as a `vless://` URI. Literal URIs are returned as-is.
pub fn build_uri(entry: &ConfigEntry, index: usize) -> Result<String, BuildError> {
    match entry {
        ConfigEntry::RawUri(raw) => Ok(raw.clone()),
        ConfigEntry::Outbound(outbound) => build_outbound_uri(outbound, index),
    }
}

/// Like [`build_uri`], but a failure becomes a placeholder URI so one bad
/// entry does not sink the batch.
pub fn render_uri(entry: &ConfigEntry, index: usize) -> (String, Option<BuildError>) {
    match build_uri(entry, index) {
        Ok(uri) => (uri, None),
        Err(err) => (sentinel_uri(&err.to_string(), index), Some(err)),
    }
}

pub fn sentinel_uri(message: &str, index: usize) -> String {
    format!(
        "{}error@0.0.0.0:0?error={}#Error_{}",
        SCHEME_PREFIX,
        encode(message),
        index
    )
}

/// Replaces (or appends) the `#fragment` with the encoded display name.
pub fn with_fragment(uri: &str, name: &str) -> String {
    let base = match uri.split_once('#') {
        Some((base, _)) => base,
        None => uri,
    };
    format!("{}#{}", base, encode(name))
}

fn build_outbound_uri(config: &OutboundConfig, index: usize) -> Result<String, BuildError> {
    if config.identity.is_empty() {
        return Err(BuildError::MissingIdentity);
    }
    if config.address.is_empty() {
        return Err(BuildError::MissingAddress);
    }

    let mut params: Vec<(&str, String)> = vec![
        ("type", config.transport.name().to_string()),
        ("security", config.security.name().to_string()),
    ];
    push_security_params(&mut params, &config.security);
    push_transport_params(&mut params, &config.transport);
    if let Some(ref flow) = config.flow {
        params.push(("flow", flow.clone()));
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    let fragment = match config.tag {
        Some(ref tag) => encode(tag).into_owned(),
        None => encode(&format!("Config {}", index)).into_owned(),
    };

    Ok(format!(
        "{}{}@{}:{}?{}#{}",
        SCHEME_PREFIX, config.identity, config.address, config.port, query, fragment
    ))
}

fn push_security_params(params: &mut Vec<(&str, String)>, security: &Security) {
    match security {
        Security::Tls(tls) => {
            if let Some(ref sni) = tls.server_name {
                params.push(("sni", sni.clone()));
            }
            push_alpn(params, &tls.alpn);
        }
        Security::Reality(reality) => {
            if let Some(ref sni) = reality.server_name {
                params.push(("sni", sni.clone()));
            }
            if let Some(ref pbk) = reality.public_key {
                params.push(("pbk", pbk.clone()));
            }
            if let Some(ref sid) = reality.short_id {
                params.push(("sid", sid.clone()));
            }
            if let Some(ref fp) = reality.fingerprint {
                params.push(("fp", fp.clone()));
            }
            push_alpn(params, &reality.alpn);
        }
        Security::None | Security::Other(_) => {}
    }
}

fn push_alpn(params: &mut Vec<(&str, String)>, alpn: &[String]) {
    if !alpn.is_empty() {
        params.push(("alpn", alpn.join(",")));
    }
}

fn push_transport_params(params: &mut Vec<(&str, String)>, transport: &Transport) {
    match transport {
        Transport::Ws { path, host } => {
            params.push(("path", encode(path.as_deref().unwrap_or("/")).into_owned()));
            if let Some(host) = host {
                params.push(("host", host.clone()));
            }
        }
        Transport::Grpc { service_name } => {
            if let Some(name) = service_name {
                params.push(("serviceName", encode(name).into_owned()));
            }
        }
        Transport::Tcp { header_type } => {
            if let Some(kind) = header_type.as_deref().filter(|k| *k != "none") {
                params.push(("headerType", kind.to_string()));
            }
        }
        Transport::H2 { path, hosts } | Transport::Http { path, hosts } => {
            params.push(("path", encode(path.as_deref().unwrap_or("/")).into_owned()));
            if !hosts.is_empty() {
                params.push(("host", hosts.join(",")));
            }
        }
        Transport::Other(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{RealityParams, TlsParams};

    fn base() -> OutboundConfig {
        OutboundConfig {
            identity: "uuid-1".to_string(),
            address: "1.2.3.4".to_string(),
            ..OutboundConfig::default()
        }
    }

    fn query_keys(uri: &str) -> Vec<String> {
        let query = uri
            .split_once('?')
            .map(|(_, rest)| rest.split('#').next().unwrap_or_default())
            .unwrap_or_default();
        query
            .split('&')
            .filter_map(|pair| pair.split('=').next())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn ws_tls_layout() {
        let config = OutboundConfig {
            tag: Some("srv1".to_string()),
            transport: Transport::Ws {
                path: Some("/ws".to_string()),
                host: None,
            },
            security: Security::Tls(TlsParams {
                server_name: Some("example.com".to_string()),
                alpn: Vec::new(),
            }),
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 1).expect("build");
        assert_eq!(
            uri,
            "vless://uuid-1@1.2.3.4:443?type=ws&security=tls&sni=example.com&path=%2Fws#srv1"
        );
    }

    #[test]
    fn raw_uri_passes_through() {
        let raw = "vless://a@b:1?type=tcp#x";
        let entry = ConfigEntry::RawUri(raw.to_string());
        assert_eq!(build_uri(&entry, 3).expect("build"), raw);
        assert_eq!(with_fragment(raw, "🚀 Node 1"), "vless://a@b:1?type=tcp#%F0%9F%9A%80%20Node%201");
        assert_eq!(with_fragment("vless://a@b:1", "n"), "vless://a@b:1#n");
    }

    #[test]
    fn ws_defaults_path_and_excludes_other_transport_params() {
        let config = OutboundConfig {
            transport: Transport::Ws {
                path: None,
                host: Some("cdn.example".to_string()),
            },
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 1).expect("build");
        assert!(uri.contains("path=%2F&host=cdn.example"));
        let keys = query_keys(&uri);
        assert!(!keys.iter().any(|k| k == "serviceName" || k == "headerType"));
    }

    #[test]
    fn reality_emits_only_present_fields() {
        let config = OutboundConfig {
            security: Security::Reality(RealityParams {
                server_name: Some("www.example.com".to_string()),
                public_key: Some("PBK".to_string()),
                short_id: None,
                fingerprint: Some("chrome".to_string()),
                alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            }),
            flow: Some("xtls-rprx-vision".to_string()),
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 4).expect("build");
        assert_eq!(
            uri,
            "vless://uuid-1@1.2.3.4:443?type=tcp&security=reality&sni=www.example.com&pbk=PBK&fp=chrome&alpn=h2,http/1.1&flow=xtls-rprx-vision#Config%204"
        );
        assert!(!query_keys(&uri).contains(&"sid".to_string()));
    }

    #[test]
    fn tls_never_emits_reality_fields() {
        let config = OutboundConfig {
            security: Security::Tls(TlsParams {
                server_name: None,
                alpn: vec!["h2".to_string()],
            }),
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 1).expect("build");
        let keys = query_keys(&uri);
        for forbidden in ["pbk", "sid", "fp", "sni"] {
            assert!(!keys.iter().any(|k| k == forbidden), "{} in {}", forbidden, uri);
        }
        assert!(uri.contains("alpn=h2"));
    }

    #[test]
    fn grpc_service_name_is_encoded() {
        let config = OutboundConfig {
            transport: Transport::Grpc {
                service_name: Some("svc/a b".to_string()),
            },
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 1).expect("build");
        assert!(uri.contains("type=grpc&security=none&serviceName=svc%2Fa%20b#"));
    }

    #[test]
    fn tcp_header_type_none_is_omitted() {
        let none = OutboundConfig {
            transport: Transport::Tcp {
                header_type: Some("none".to_string()),
            },
            ..base()
        };
        let http = OutboundConfig {
            transport: Transport::Tcp {
                header_type: Some("http".to_string()),
            },
            ..base()
        };
        let none_uri = build_uri(&ConfigEntry::Outbound(none), 1).expect("build");
        let http_uri = build_uri(&ConfigEntry::Outbound(http), 1).expect("build");
        assert!(!none_uri.contains("headerType"));
        assert!(http_uri.contains("&headerType=http#"));
    }

    #[test]
    fn h2_hosts_are_joined() {
        let config = OutboundConfig {
            port: 8443,
            transport: Transport::H2 {
                path: None,
                hosts: vec!["a.example".to_string(), "b.example".to_string()],
            },
            ..base()
        };
        let uri = build_uri(&ConfigEntry::Outbound(config), 1).expect("build");
        assert!(uri.starts_with("vless://uuid-1@1.2.3.4:8443?type=h2&security=none&path=%2F&host=a.example,b.example#"));
    }

    #[test]
    fn failure_becomes_sentinel() {
        let config = OutboundConfig {
            identity: String::new(),
            ..base()
        };
        let (uri, err) = render_uri(&ConfigEntry::Outbound(config), 7);
        assert_eq!(err, Some(BuildError::MissingIdentity));
        assert_eq!(uri, "vless://error@0.0.0.0:0?error=missing%20user%20id#Error_7");

        let config = OutboundConfig {
            address: String::new(),
            ..base()
        };
        let (uri, err) = render_uri(&ConfigEntry::Outbound(config), 2);
        assert_eq!(err, Some(BuildError::MissingAddress));
        assert!(uri.ends_with("#Error_2"));
    }
}
