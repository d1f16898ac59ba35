//! Terminal participant client for a Hayaoshi quiz room.
//!
//! Connects to the room coordination service, joins a room by access code,
//! and plays from the terminal: questions are answered with the option
//! number, other input is sent as chat.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin client -- --access-code ABC123 --name Ana
//! cargo run --bin client -- -a ABC123 -n Ana --token <session token>
//! ```

use clap::Parser;

use hayaoshi::common::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "Terminal participant client for Hayaoshi quiz rooms", long_about = None)]
struct Args {
    /// Access code of the room to join
    #[arg(short = 'a', long)]
    access_code: String,

    /// Display name inside the room
    #[arg(short = 'n', long)]
    name: String,

    /// Identity token issued by the session provider
    #[arg(short = 't', long, default_value = "")]
    token: String,

    /// Room coordination service URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = hayaoshi::client::run_client(args.url, args.token, args.access_code, args.name).await
    {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
