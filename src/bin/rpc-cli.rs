use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "rpc-cli")]
#[command(about = "Client for a running circuit-rpc gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one JSON-RPC call through the gateway
    Call {
        /// Method name, e.g. eth_blockNumber
        method: String,
        /// Params as a JSON array or object
        params: Option<String>,
        /// Chain name; defaults to the gateway's first chain
        #[arg(short, long)]
        chain: Option<String>,
        /// Return the first answer without cross-checking
        #[arg(long)]
        no_check: bool,
    },
    /// Show circuit and pool health
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Call {
            method,
            params,
            chain,
            no_check,
        } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!([]),
            };
            let url = match chain {
                Some(chain) => format!("{base}/rpc/{chain}"),
                None => format!("{base}/"),
            };
            let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });

            let mut request = client.post(url).json(&body);
            if no_check {
                request = request.header("x-no-check", "true");
            }
            let res = request.send().await?;
            if let Some(agreement) = res.headers().get("x-consensus").and_then(|v| v.to_str().ok()) {
                eprintln!("consensus: {}", agreement);
            }
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client.get(format!("{base}/status")).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
