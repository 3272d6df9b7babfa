use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "orchestrator-cli")]
#[command(about = "Command line client for the provider orchestrator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "ORCHESTRATOR_ADMIN_API_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show circuits, usage and success rate
    Status,
    /// Show the most recent attempts
    Attempts {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Flip elapsed open circuits to half-open now
    Sweep,
    /// Solve a problem on behalf of a persona
    Solve {
        #[arg(short, long)]
        persona: String,

        /// Deadline in milliseconds
        #[arg(short, long)]
        deadline_ms: Option<u64>,

        problem: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let res = match cli.command {
        Commands::Status => {
            let path = if cli.key.is_empty() { "v1/status" } else { "admin/status" };
            client
                .get(format!("{}/{}", cli.url, path))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Attempts { limit } => {
            client
                .get(format!("{}/admin/attempts", cli.url))
                .query(&[("limit", limit)])
                .headers(headers)
                .send()
                .await?
        }
        Commands::Sweep => {
            client
                .post(format!("{}/admin/circuits/sweep", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Solve {
            persona,
            deadline_ms,
            problem,
        } => {
            let body = json!({
                "problem": problem.join(" "),
                "persona": persona,
                "deadline_ms": deadline_ms,
            });
            client
                .post(format!("{}/v1/solve", cli.url))
                .json(&body)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: orchestrator returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
