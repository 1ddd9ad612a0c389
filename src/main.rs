use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use what2eat::places::{known_cuisines, GooglePlacesClient};
use what2eat::quota::format_reset_eta;
use what2eat::{Config, Recommender};

/// what2eat: pick somewhere to eat nearby.
///
/// Examples:
///   what2eat serve --port 8080
///   what2eat recommend --lat 25.0330 --lng 121.5654 --type 咖啡廳
///   what2eat usage
///   what2eat reset-quota
#[derive(Parser)]
#[command(name = "what2eat", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Bind address (overrides HOST).
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// One-shot recommendation, printed as JSON.
    Recommend {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Cuisine type, e.g. 日式料理. Empty means any restaurant.
        #[arg(long = "type", default_value = "")]
        cuisine: String,
    },
    /// Show today's API usage and time until reset.
    Usage,
    /// Zero today's API usage counter.
    ResetQuota,
    /// List cuisine types with tuned search keywords.
    Cuisines,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Cuisines = cli.command {
        for c in known_cuisines() {
            println!("{}", c);
        }
        return;
    }

    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let client = Arc::new(GooglePlacesClient::new(config.api_key.clone(), config.request_timeout()));

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let recommender = Recommender::from_config(&config, client);
            let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
                eprintln!("Error: Cannot start runtime: {}", e);
                std::process::exit(1);
            });
            if let Err(e) = runtime.block_on(what2eat::server::start(&config, recommender)) {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Command::Recommend { lat, lng, cuisine } => {
            let recommender = Recommender::from_config(&config, client);
            match recommender.recommend(lat, lng, &cuisine) {
                Ok(rec) => {
                    eprintln!("  {}", rec.message);
                    match serde_json::to_string_pretty(&rec.restaurants) {
                        Ok(json) => println!("{}", json),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Usage => {
            let recommender = Recommender::from_config(&config, client);
            let (current, limit) = recommender.usage();
            println!("{}/{} (resets in {})", current, limit, format_reset_eta(recommender.time_until_reset()));
            println!("{}", recommender.quota().reference_time());
        }
        Command::ResetQuota => {
            let recommender = Recommender::from_config(&config, client);
            recommender.quota().reset();
            println!("Quota reset: {}", recommender.quota().usage_string());
        }
        Command::Cuisines => {}
    }
}
