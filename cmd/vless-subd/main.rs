use std::env;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vless_sub::cache::SubscriptionCache;
use vless_sub::fetch::HttpFetcher;
use vless_sub::naming::RandomSymbols;
use vless_sub::pipeline::{ConvertOutcome, ConvertRequest, NamedEntry, Pipeline, PipelineError};
use vless_sub::settings::ServiceSettings;
use vless_sub::telemetry::Telemetry;
use vless_sub::validation::validate_subscription_url;

type HttpResponse = Response<Cursor<Vec<u8>>>;

#[derive(Debug, Parser)]
#[command(name = "vless-subd", version, about = "Serve VLESS subscription conversion over HTTP")]
struct Args {
    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    workers: Option<usize>,
    /// Directory served for plain GET requests
    #[arg(long)]
    web_root: Option<String>,
    #[arg(long)]
    cache_ttl_secs: Option<u64>,
    #[arg(long)]
    fetch_timeout_secs: Option<u64>,
}

struct Context {
    pipeline: Pipeline<HttpFetcher>,
    telemetry: Arc<Telemetry>,
    web_root: Option<String>,
}

fn main() {
    let args = Args::parse();
    let settings = match load_settings(&args) {
        Ok(s) => s,
        Err(err) => exit_with(&err),
    };
    init_tracing(&settings.log_filter);

    let fetcher = match HttpFetcher::new(&settings.fetch_settings()) {
        Ok(f) => f,
        Err(err) => exit_with(&format!("failed to build http client: {}", err)),
    };
    let telemetry = Arc::new(Telemetry::new());
    let cache = Arc::new(SubscriptionCache::new(settings.cache_ttl()));
    let pipeline = Pipeline::new(fetcher, cache)
        .with_telemetry(Arc::clone(&telemetry))
        .with_default_label(settings.default_label.clone());
    let context = Arc::new(Context {
        pipeline,
        telemetry,
        web_root: settings.web_root.clone(),
    });

    let server = match Server::http(&settings.bind) {
        Ok(s) => Arc::new(s),
        Err(err) => {
            error!(bind = %settings.bind, error = %err, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(
        bind = %settings.bind,
        workers = settings.workers,
        cache_ttl_secs = settings.cache_ttl_secs,
        "vless-subd listening"
    );

    let workers: Vec<_> = (0..settings.workers)
        .map(|_| {
            let server = Arc::clone(&server);
            let context = Arc::clone(&context);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    handle_request(request, &context);
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }
}

fn load_settings(args: &Args) -> Result<ServiceSettings, String> {
    let mut settings = match args.config {
        Some(ref path) => ServiceSettings::load(path).map_err(|e| e.to_string())?,
        None => ServiceSettings::default(),
    };
    if let Ok(port) = env::var("PORT") {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("invalid PORT value: {}", port))?;
        settings.override_port(port);
    }
    if let Some(ref bind) = args.bind {
        settings.bind = bind.clone();
    }
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    if let Some(ref root) = args.web_root {
        settings.web_root = Some(root.clone());
    }
    if let Some(ttl) = args.cache_ttl_secs {
        settings.cache_ttl_secs = ttl;
    }
    if let Some(timeout) = args.fetch_timeout_secs {
        settings.fetch_timeout_secs = timeout;
    }
    settings.validate().map_err(|e| e.to_string())?;
    Ok(settings)
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn handle_request(mut request: Request, context: &Context) {
    let method = request.method().clone();
    let path = request
        .url()
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let response = match (&method, path.as_str()) {
        (Method::Options, _) => reply_json(200, &serde_json::json!({})),
        (Method::Post, "/convert") => handle_convert(&mut request, context),
        (Method::Post, "/validate") => handle_validate(&mut request),
        (Method::Get, "/health") => reply_json(200, &health()),
        (Method::Get, "/api/telemetry") => reply_json(200, &context.telemetry.snapshot()),
        (_, "/convert") | (_, "/validate") => reply_error(405, "Method not allowed"),
        (Method::Get, _) => serve_static(&path, context.web_root.as_deref()),
        _ => reply_error(404, "not found"),
    };
    if let Err(err) = request.respond(response) {
        warn!(path = %path, error = %err, "failed to write response");
    }
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    success: bool,
    configs: Vec<NamedEntry>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: f64,
}

fn handle_convert(request: &mut Request, context: &Context) -> HttpResponse {
    let mut body = String::new();
    if request.as_reader().read_to_string(&mut body).is_err() {
        return reply_error(400, "failed to read request");
    }
    let payload: ConvertRequest = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "rejected convert request with invalid json");
            return reply_error(400, &format!("invalid json: {}", err));
        }
    };

    let mut symbols = RandomSymbols::thread_local();
    match context.pipeline.run(&payload, &mut symbols) {
        Ok(ConvertOutcome::Converted(configs)) => {
            let count = configs.len();
            reply_json(
                200,
                &ConvertResponse {
                    success: true,
                    configs,
                    count,
                },
            )
        }
        Ok(ConvertOutcome::Empty) => reply_error(400, "No VLESS configs found"),
        Err(err @ PipelineError::EmptyUrl) => reply_error(400, &err.to_string()),
        Err(err) => reply_error(500, &err.to_string()),
    }
}

fn handle_validate(request: &mut Request) -> HttpResponse {
    let mut body = String::new();
    let payload = request
        .as_reader()
        .read_to_string(&mut body)
        .ok()
        .and_then(|_| serde_json::from_str::<ValidateRequest>(&body).ok());
    let response = match payload {
        Some(payload) => match validate_subscription_url(&payload.url) {
            Ok(()) => ValidateResponse {
                valid: true,
                message: "URL is valid".to_string(),
            },
            Err(rejection) => ValidateResponse {
                valid: false,
                message: rejection.to_string(),
            },
        },
        None => ValidateResponse {
            valid: false,
            message: "Validation error".to_string(),
        },
    };
    reply_json(200, &response)
}

fn health() -> HealthResponse {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    HealthResponse {
        status: "ok",
        timestamp,
    }
}

fn serve_static(path: &str, root: Option<&str>) -> HttpResponse {
    let Some(root) = root else {
        return reply_error(404, "not found");
    };
    let mut relative = path.trim_start_matches('/').to_string();
    if relative.is_empty() {
        relative = "index.html".to_string();
    }
    if relative.contains("..") {
        return reply_error(404, "not found");
    }

    let full_path = Path::new(root).join(&relative);
    match fs::read(&full_path) {
        Ok(data) => with_headers(
            Response::from_data(data).with_status_code(StatusCode(200)),
            content_type_for_path(&relative),
        ),
        Err(_) => reply_error(404, "not found"),
    }
}

fn content_type_for_path(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html; charset=utf-8"
    } else if path.ends_with(".css") {
        "text/css; charset=utf-8"
    } else if path.ends_with(".js") {
        "application/javascript; charset=utf-8"
    } else if path.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}

fn reply_json<T: Serialize>(status: u16, body: &T) -> HttpResponse {
    let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    with_headers(
        Response::from_string(body).with_status_code(StatusCode(status)),
        "application/json",
    )
}

fn reply_error(status: u16, message: &str) -> HttpResponse {
    reply_json(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn with_headers(mut response: HttpResponse, content_type: &str) -> HttpResponse {
    let headers = [
        ("Content-Type", content_type),
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "POST, GET, OPTIONS"),
        ("Access-Control-Allow-Headers", "Content-Type"),
    ];
    for (name, value) in headers {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

fn exit_with(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
