use clap::Parser;
use serde_json::Value;

use rexroute::websocket::Dialer;

#[derive(Parser)]
#[command(name = "ws-send")]
#[command(about = "Send one JSON payload to a rexroute WebSocket hub", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// JSON payload, e.g. '{"event":"deploy"}'
    payload: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let payload: Value = serde_json::from_str(&cli.payload)?;

    let dialer = Dialer::new(cli.url);
    dialer.send(&payload).await?;
    println!("sent to {}", dialer.addr());
    Ok(())
}
