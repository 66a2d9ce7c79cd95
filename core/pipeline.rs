use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{cache_key, SubscriptionCache};
use crate::entry::{ConfigEntry, EntrySummary};
use crate::fetch::{FetchError, Fetcher};
use crate::naming::{assign_names, NamingOptions, SymbolSource, DEFAULT_LABEL};
use crate::parser::{parse_subscription, ParseError};
use crate::telemetry::Telemetry;
use crate::uri::{render_uri, with_fragment};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Subscription URL is required")]
    EmptyUrl,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default, rename = "includeLocation")]
    pub include_location: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedEntry {
    pub name: String,
    pub uri: String,
    #[serde(flatten)]
    pub summary: EntrySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum ConvertOutcome {
    Converted(Vec<NamedEntry>),
    /// The subscription held no VLESS entries.
    Empty,
}

impl ConvertOutcome {
    pub fn entries(&self) -> &[NamedEntry] {
        match self {
            ConvertOutcome::Converted(entries) => entries,
            ConvertOutcome::Empty => &[],
        }
    }
}

pub struct Pipeline<F> {
    fetcher: F,
    cache: Arc<SubscriptionCache>,
    telemetry: Arc<Telemetry>,
    default_label: String,
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(fetcher: F, cache: Arc<SubscriptionCache>) -> Self {
        Self {
            fetcher,
            cache,
            telemetry: Arc::new(Telemetry::new()),
            default_label: DEFAULT_LABEL.to_string(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = label.into();
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Subscription text for `url`, served from the cache while fresh.
    pub fn load(&self, url: &str) -> Result<Arc<str>, FetchError> {
        let key = cache_key(url);
        if let Some(text) = self.cache.get(&key) {
            debug!(key = &key[..12], "subscription cache hit");
            self.telemetry.record_cache(true);
            return Ok(text);
        }
        debug!(key = &key[..12], "subscription cache miss");
        self.telemetry.record_cache(false);
        let text = self.fetcher.fetch(url.trim())?;
        self.cache.put(&key, &text);
        Ok(Arc::from(text))
    }

    pub fn run(
        &self,
        request: &ConvertRequest,
        symbols: &mut dyn SymbolSource,
    ) -> Result<ConvertOutcome, PipelineError> {
        let result = self.run_inner(request, symbols);
        match result {
            Ok(ref outcome) => {
                let count = outcome.entries().len();
                self.telemetry.record_conversion(count);
                info!(host = %source_host(&request.url), entries = count, "subscription converted");
            }
            Err(PipelineError::EmptyUrl) => {
                warn!("rejected conversion without a subscription url");
            }
            Err(ref err) => {
                if let PipelineError::Fetch(_) = err {
                    self.telemetry.record_fetch_failure();
                }
                self.telemetry.record_error(err.to_string());
                error!(host = %source_host(&request.url), error = %err, "subscription conversion failed");
            }
        }
        result
    }

    fn run_inner(
        &self,
        request: &ConvertRequest,
        symbols: &mut dyn SymbolSource,
    ) -> Result<ConvertOutcome, PipelineError> {
        let url = request.url.trim();
        if url.is_empty() {
            return Err(PipelineError::EmptyUrl);
        }
        let text = self.load(url)?;
        let options = NamingOptions {
            prefix: request.prefix.clone(),
            include_location: request.include_location,
            default_label: self.default_label.clone(),
        };
        let outcome = convert_text(&text, &options, symbols)?;
        let failed = outcome.entries().iter().filter(|e| e.error.is_some()).count();
        for _ in 0..failed {
            self.telemetry.record_build_error();
        }
        Ok(outcome)
    }
}

/// Parse, name, and render an already-fetched subscription body.
pub fn convert_text(
    text: &str,
    options: &NamingOptions,
    symbols: &mut dyn SymbolSource,
) -> Result<ConvertOutcome, ParseError> {
    let entries = parse_subscription(text)?;
    if entries.is_empty() {
        return Ok(ConvertOutcome::Empty);
    }
    let names = assign_names(&entries, options, symbols);
    let named = entries
        .iter()
        .zip(names)
        .enumerate()
        .map(|(i, (entry, name))| name_entry(entry, name, i + 1))
        .collect();
    Ok(ConvertOutcome::Converted(named))
}

fn name_entry(entry: &ConfigEntry, name: String, index: usize) -> NamedEntry {
    let (uri, failure) = render_uri(entry, index);
    match failure {
        Some(ref err) => warn!(index, error = %err, "entry replaced with placeholder uri"),
        None => debug!(index, "entry rendered"),
    }
    NamedEntry {
        uri: with_fragment(&uri, &name),
        name,
        summary: entry.summary(),
        error: failure.map(|e| e.to_string()),
    }
}

fn source_host(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "?".to_string())
}
