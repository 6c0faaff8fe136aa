use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use remote_mux::codec::{self, Value};
use remote_mux::remote::{EventFrame, RemoteClient};

#[derive(Parser)]
#[command(name = "remote-cli")]
#[command(about = "Call remote functions and follow the event stream", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Sent as `x-api-key` when the server requires one.
    #[arg(short, long)]
    key: Option<String>,

    #[arg(long, default_value = "/remote")]
    remote_path: String,

    #[arg(long, default_value = "/events")]
    events_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a remote function. Arguments are JSON (envelopes allowed);
    /// anything that is not JSON is sent as a string.
    Call { name: String, args: Vec<String> },
    /// Print every event until the stream closes
    Events {
        /// Also print heartbeat frames
        #[arg(long)]
        heartbeats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');

    let mut client = RemoteClient::new(format!("{}{}", base, cli.remote_path));
    if let Some(key) = &cli.key {
        client = client.header("x-api-key", key)?;
    }

    match cli.command {
        Commands::Call { name, args } => {
            let args: Vec<Value> = args.iter().map(|arg| parse_arg(arg)).collect();
            match client.call(&name, &args).await {
                Ok(value) => println!("{}", render(&value)),
                Err(err) => {
                    eprintln!("Error: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Commands::Events { heartbeats } => {
            let mut events = client.events(&format!("{}{}", base, cli.events_path)).await?;
            while let Some(frame) = events.next().await {
                match frame? {
                    EventFrame::Heartbeat if heartbeats => println!("(heartbeat)"),
                    EventFrame::Heartbeat => {}
                    EventFrame::Event(value) => println!("{}", render(&value)),
                }
            }
        }
    }

    Ok(())
}

fn parse_arg(arg: &str) -> Value {
    codec::decode_plain(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn render(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Binary(blob) => format!(
            "<{} bytes{}>",
            blob.len(),
            blob.filename().map(|name| format!(", {}", name)).unwrap_or_default()
        ),
        other => codec::encode_json(other).unwrap_or_else(|err| format!("<{}>", err)),
    }
}
