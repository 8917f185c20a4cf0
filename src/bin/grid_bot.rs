//! Grid Trading Bot Binary
//!
//! Runs one grid engine per configured symbol plus the balance manager
//! against Binance spot.
//!
//! ## Setup
//!
//! 1. Create a `.env` file in the project root:
//!    ```
//!    GRIDBOT_EXCHANGE__API_KEY=yourKey
//!    GRIDBOT_EXCHANGE__API_SECRET=yourSecret
//!    ```
//!
//! 2. Run the bot:
//!    ```bash
//!    cargo run --bin grid_bot -- --config config.toml
//!    ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use stablegrid::{BinanceSpotClient, Runner, Settings, WebhookNotifier};

#[tokio::main]
async fn main() {
    // Load .env file before reading settings so env overrides apply
    match dotenvy::dotenv() {
        Ok(path) => println!("Loaded environment from: {}", path.display()),
        Err(_) => println!("No .env file found, using system environment variables"),
    }

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].clone()
    } else {
        "config".to_string()
    };

    let settings = match Settings::new(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load config '{config_path}': {e}");
            return;
        }
    };

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", &settings.log.level);
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = settings.validate() {
        error!("Invalid configuration: {e}");
        return;
    }

    info!("Starting grid bot for {} symbol(s)", settings.symbols.len());
    for symbol in &settings.symbols {
        info!(
            "  {}: base={}, {} rungs of {} every {}, take-profit +{}",
            symbol.symbol,
            symbol.base_price,
            symbol.max_orders,
            symbol.order_amount,
            symbol.price_interval,
            symbol.profit_interval
        );
    }

    let exchange = match BinanceSpotClient::new(
        settings.exchange.api_key.clone(),
        settings.exchange.api_secret.clone(),
        settings.exchange.base_url.clone(),
        Duration::from_secs(settings.exchange.timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create exchange client: {e}");
            return;
        }
    };

    let notifier = Arc::new(WebhookNotifier::new(settings.webhook.clone()));

    let runner = Runner::new(exchange, notifier);
    if let Err(e) = runner.run(&settings).await {
        error!("Runner failed to start: {e}");
    }
}
