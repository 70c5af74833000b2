use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the content filtering proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the proxy is accepting connections
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/status", cli.url.trim_end_matches('/')))
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: Admin API returned status {}", status);
                std::process::exit(1);
            }

            match res.text().await?.trim() {
                "true" => println!("running"),
                "false" => println!("stopped"),
                other => {
                    eprintln!("Error: unexpected status body {:?}", other);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
