use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use vless_sub::cache::SubscriptionCache;
use vless_sub::fetch::{FetchSettings, Fetcher, HttpFetcher, StaticFetcher};
use vless_sub::naming::RandomSymbols;
use vless_sub::pipeline::{ConvertOutcome, ConvertRequest, NamedEntry, Pipeline};
use vless_sub::validation::validate_subscription_url;

#[derive(Debug, Parser)]
#[command(name = "vless-sub", version, about = "Convert VLESS subscriptions into vless:// links")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a subscription and print its links
    Convert {
        #[arg(long)]
        url: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Convert a subscription saved on disk
    Parse {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Check that a subscription url uses http or https
    Validate { url: String },
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Label placed between the symbol and the index
    #[arg(long)]
    prefix: Option<String>,
    /// Prepend a flag guessed from the tag or address
    #[arg(long)]
    location: bool,
    /// Print the same JSON body the daemon returns
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ConvertResponse<'a> {
    success: bool,
    configs: &'a [NamedEntry],
    count: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vless_sub=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Convert { url, output } => {
            let fetcher = match HttpFetcher::new(&FetchSettings::default()) {
                Ok(f) => f,
                Err(err) => exit_with(&err.to_string()),
            };
            run(fetcher, &url, &output);
        }
        Command::Parse { file, output } => {
            let body = match fs::read(&file) {
                Ok(b) => b,
                Err(err) => exit_with(&format!("failed to read {}: {}", file.display(), err)),
            };
            let source = file.display().to_string();
            let fetcher = StaticFetcher::default().with_body(&source, body);
            run(fetcher, &source, &output);
        }
        Command::Validate { url } => match validate_subscription_url(&url) {
            Ok(()) => println!("URL is valid"),
            Err(rejection) => exit_with(&rejection.to_string()),
        },
    }
}

fn run<F: Fetcher>(fetcher: F, source: &str, output: &OutputArgs) {
    let pipeline = Pipeline::new(fetcher, Arc::new(SubscriptionCache::default()));
    let request = ConvertRequest {
        url: source.to_string(),
        prefix: output.prefix.clone(),
        include_location: output.location,
    };
    let mut symbols = RandomSymbols::thread_local();
    let configs = match pipeline.run(&request, &mut symbols) {
        Ok(ConvertOutcome::Converted(configs)) => configs,
        Ok(ConvertOutcome::Empty) => exit_with("No VLESS configs found"),
        Err(err) => exit_with(&err.to_string()),
    };

    if output.json {
        let payload = ConvertResponse {
            success: true,
            configs: &configs,
            count: configs.len(),
        };
        let json = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
        println!("{}", json);
    } else {
        for entry in &configs {
            println!("{}", entry.uri);
        }
    }
}

fn exit_with(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
