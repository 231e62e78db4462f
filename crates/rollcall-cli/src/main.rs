use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// `#[zbus::proxy]` generates the async `RollcallProxy` used below.
#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn enroll_person(&self, name: &str, image_paths: Vec<String>) -> zbus::Result<String>;
    async fn set_overlay(&self, enabled: bool) -> zbus::Result<()>;
    async fn observations(&self) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall face recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from one or more photos
    Enroll {
        /// Person's name (label in the gallery)
        #[arg(short, long)]
        name: String,
        /// Photo files to learn from
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Poll and print recognition output
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// List enrolled identities
    List,
    /// Turn landmark overlays on or off
    Overlay {
        /// "on" or "off"
        state: String,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus — is rollcalld running?")?;
    let proxy = RollcallProxy::new(&connection)
        .await
        .context("failed to reach rollcalld")?;

    match cli.command {
        Commands::Enroll { name, images } => {
            let paths: Vec<String> = images
                .iter()
                .map(|p| {
                    p.canonicalize()
                        .with_context(|| format!("cannot resolve {}", p.display()))
                        .map(|p| p.to_string_lossy().into_owned())
                })
                .collect::<Result<_>>()?;

            let message = proxy.enroll_person(name.trim(), paths).await?;
            println!("{message}");
        }
        Commands::Watch { interval_ms } => loop {
            let raw = proxy.observations().await?;
            print_observations(&raw);
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        },
        Commands::List => {
            let raw = proxy.list_identities().await?;
            let identities: serde_json::Value = serde_json::from_str(&raw)?;
            match identities.as_array() {
                Some(entries) if !entries.is_empty() => {
                    for entry in entries {
                        println!(
                            "{}  samples={}  source={}",
                            entry["label"].as_str().unwrap_or("?"),
                            entry["samples"],
                            entry["source"].as_str().unwrap_or("?"),
                        );
                    }
                }
                _ => println!("no identities enrolled"),
            }
        }
        Commands::Overlay { state } => {
            let enabled = match state.as_str() {
                "on" => true,
                "off" => false,
                other => anyhow::bail!("expected 'on' or 'off', got '{other}'"),
            };
            proxy.set_overlay(enabled).await?;
            println!("overlay {state}");
        }
        Commands::Status => {
            println!("{}", proxy.status().await?);
        }
    }

    Ok(())
}

fn print_observations(raw: &str) {
    let Ok(serde_json::Value::Array(observations)) = serde_json::from_str(raw) else {
        return;
    };
    if observations.is_empty() {
        return;
    }
    for obs in observations {
        let label = obs["label"].as_str().unwrap_or("unknown");
        let distance = obs["distance"]
            .as_f64()
            .map(|d| format!(" ({:.0}% match)", (1.0 - d).max(0.0) * 100.0))
            .unwrap_or_default();
        let extras = match (obs["gender"].as_str(), obs["age"].as_f64()) {
            (Some(gender), Some(age)) => format!("  [{gender}, ~{age:.0}y]"),
            _ => String::new(),
        };
        println!("{label}{distance}{extras}");
    }
}
