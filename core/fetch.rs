use std::collections::HashMap;
use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

// Accepts missing padding and stray bits in the final symbol.
const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_allow_trailing_bits(true)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch subscription: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to fetch subscription: upstream returned HTTP {0}")]
    Status(u16),
    #[error("failed to fetch subscription: body is not valid UTF-8 text")]
    Decode,
    #[error("failed to fetch subscription: {0}")]
    Unavailable(String),
}

/// Source of raw subscription text.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "*/*")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes()?;
        debug!(bytes = body.len(), "subscription body received");
        decode_subscription_body(&body)
    }
}

/// In-memory fetcher serving canned bodies by URL.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pub bodies: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match self.bodies.get(url) {
            Some(body) => decode_subscription_body(body),
            None => Err(FetchError::Unavailable(format!("no body for {}", url))),
        }
    }
}

/// Unwraps a base64 envelope when the body is one, otherwise returns the body
/// as UTF-8 text.
pub fn decode_subscription_body(body: &[u8]) -> Result<String, FetchError> {
    if let Some(text) = decode_envelope(body) {
        return Ok(text);
    }
    String::from_utf8(body.to_vec()).map_err(|_| FetchError::Decode)
}

fn decode_envelope(body: &[u8]) -> Option<String> {
    let cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let engines = [("standard", &STANDARD_LENIENT), ("url-safe", &URL_SAFE_LENIENT)];
    for (name, engine) in engines {
        if let Ok(decoded) = engine.decode(&cleaned) {
            if let Ok(text) = String::from_utf8(decoded) {
                trace!(alphabet = name, "decoded base64 envelope");
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use std::thread;
    use tiny_http::{Request, Response, Server, StatusCode};

    fn serve<H>(handler: H) -> String
    where
        H: Fn(Request) + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("ip listener")
            .port();
        thread::spawn(move || {
            for request in server.incoming_requests() {
                handler(request);
            }
        });
        format!("http://127.0.0.1:{}/sub", port)
    }

    #[test]
    fn plain_body_passes_through() {
        let body = b"vless://a@b:1#x\nvless://c@d:2#y";
        let text = decode_subscription_body(body).expect("decode");
        assert_eq!(text, "vless://a@b:1#x\nvless://c@d:2#y");
    }

    #[test]
    fn base64_envelope_is_unwrapped() {
        let encoded = STANDARD.encode("vless://a@b:1#x\nvless://c@d:2#y");
        let text = decode_subscription_body(encoded.as_bytes()).expect("decode");
        assert_eq!(text, "vless://a@b:1#x\nvless://c@d:2#y");
    }

    #[test]
    fn wrapped_envelope_with_line_breaks() {
        let encoded = STANDARD.encode("{\"outbounds\":[]}");
        let (head, tail) = encoded.split_at(8);
        let body = format!("{}\r\n{}\n", head, tail);
        let text = decode_subscription_body(body.as_bytes()).expect("decode");
        assert_eq!(text, "{\"outbounds\":[]}");
    }

    #[test]
    fn unpadded_url_safe_envelope() {
        let encoded = URL_SAFE_NO_PAD.encode("vless://id@host:443?type=ws#n?");
        let text = decode_subscription_body(encoded.as_bytes()).expect("decode");
        assert_eq!(text, "vless://id@host:443?type=ws#n?");
    }

    #[test]
    fn json_body_is_not_mistaken_for_base64() {
        let body = br#"{"outbounds":[{"protocol":"vless"}]}"#;
        let text = decode_subscription_body(body).expect("decode");
        assert!(text.starts_with('{'));
    }

    #[test]
    fn binary_body_is_rejected() {
        let err = decode_subscription_body(&[0xff, 0xfe, 0x00, 0x81]).unwrap_err();
        assert!(matches!(err, FetchError::Decode));
    }

    #[test]
    fn empty_body_is_empty_text() {
        assert_eq!(decode_subscription_body(b"  \n").expect("decode"), "  \n");
    }

    #[test]
    fn trailing_bits_in_final_symbol_are_tolerated() {
        let text = decode_subscription_body(b"dmxlc3M6Ly9hQGI6MR==").expect("decode");
        assert_eq!(text, "vless://a@b:1");
    }

    #[test]
    fn http_fetch_sends_browser_user_agent() {
        let url = serve(|request| {
            let agent = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("User-Agent"))
                .map(|h| h.value.as_str().to_string())
                .unwrap_or_default();
            let _ = request.respond(Response::from_string(agent));
        });
        let fetcher = HttpFetcher::new(&FetchSettings::default()).expect("client");
        let body = fetcher.fetch(&url).expect("fetch");
        assert_eq!(body, DEFAULT_USER_AGENT);
    }

    #[test]
    fn http_fetch_rejects_error_status() {
        let url = serve(|request| {
            let _ = request.respond(Response::from_string("gone").with_status_code(StatusCode(404)));
        });
        let fetcher = HttpFetcher::new(&FetchSettings::default()).expect("client");
        let err = fetcher.fetch(&url).unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert!(err.to_string().contains("upstream returned HTTP 404"));
    }

    #[test]
    fn http_fetch_times_out() {
        let url = serve(|request| {
            thread::sleep(Duration::from_secs(3));
            let _ = request.respond(Response::from_string("late"));
        });
        let settings = FetchSettings {
            timeout: Duration::from_millis(300),
            ..FetchSettings::default()
        };
        let fetcher = HttpFetcher::new(&settings).expect("client");
        let err = fetcher.fetch(&url).unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[test]
    fn static_fetcher_reports_unknown_url() {
        let fetcher = StaticFetcher::default().with_body("https://a.example/sub", "x");
        assert!(fetcher.fetch("https://a.example/sub").is_ok());
        let err = fetcher.fetch("https://b.example/sub").unwrap_err();
        assert!(err.to_string().contains("failed to fetch subscription"));
    }
}
