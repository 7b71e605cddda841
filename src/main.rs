use mention_gateway::{config::AppConfig, init_server, init_tracing};
use std::env;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    init_tracing();

    // Config file path from the command line, defaults applied when the
    // default path does not exist
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/mention-gateway.yaml".to_string());

    let config = if Path::new(&config_path).exists() {
        match AppConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", config_path, e);
                eprintln!("Usage: mention-gateway [config_file]");
                process::exit(1);
            }
        }
    } else {
        AppConfig::default_config()
    };

    if let Err(e) = init_server(config).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
