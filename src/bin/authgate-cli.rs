use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "authgate-cli")]
#[command(about = "Management CLI for the authgate mapping table", long_about = None)]
struct Cli {
    /// Base URL of the gateway
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (auth.api_key)
    #[arg(short, long, env = "AUTHGATE_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List mapping rules in evaluation order
    List,
    /// Append a rule
    Add {
        /// host/path to match, e.g. app.example.com/api
        match_url: String,
        /// Backend base URL
        dest: String,
        /// Comma separated flags (strip_path, disabled)
        #[arg(long, value_delimiter = ',')]
        flags: Vec<String>,
    },
    /// Replace the rule at an index
    Update {
        index: usize,
        match_url: String,
        dest: String,
        #[arg(long, value_delimiter = ',')]
        flags: Vec<String>,
    },
    /// Swap a rule with the one `direction` positions away
    Move {
        index: usize,
        #[arg(allow_hyphen_values = true)]
        direction: i64,
    },
    /// Remove the rule at an index
    Delete { index: usize },
}

fn rule_body(match_url: String, dest: String, flags: Vec<String>) -> Value {
    let flags: Vec<String> = flags
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    json!({ "match_url": match_url, "http_dest": dest, "flags": flags })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/_authgate/api", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{api}/status")),
        Commands::List => client.get(format!("{api}/mappings")),
        Commands::Add {
            match_url,
            dest,
            flags,
        } => client
            .post(format!("{api}/mappings"))
            .json(&rule_body(match_url, dest, flags)),
        Commands::Update {
            index,
            match_url,
            dest,
            flags,
        } => client
            .put(format!("{api}/mappings/{index}"))
            .json(&rule_body(match_url, dest, flags)),
        Commands::Move { index, direction } => client
            .post(format!("{api}/mappings/{index}/move"))
            .json(&json!({ "direction": direction })),
        Commands::Delete { index } => client.delete(format!("{api}/mappings/{index}")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
