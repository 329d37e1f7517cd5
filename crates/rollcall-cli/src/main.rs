use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    fn ingest(&self, files: Vec<(String, Vec<u8>)>) -> zbus::Result<String>;
    fn cancel_ingest(&self) -> zbus::Result<bool>;
    fn list_photos(&self) -> zbus::Result<String>;
    fn list_labels(&self) -> zbus::Result<String>;
    fn photos_by_label(&self, label: &str) -> zbus::Result<String>;
    fn rename_label(&self, old_label: &str, new_label: &str) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall photo library CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest photos and label the faces in them
    Ingest {
        /// Image files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Cancel ingestion in progress
    Cancel,
    /// List stored photos, newest first
    Photos,
    /// List known labels
    Labels,
    /// List photos carrying a label
    ByLabel {
        label: String,
    },
    /// Rename a label, or merge it into another
    Rename {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Show daemon status
    Status,
}

/// Pretty-print a JSON reply, falling back to the raw text.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{raw}"),
        },
        Err(_) => println!("{raw}"),
    }
}

fn read_uploads(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{} is not a file path", path.display()))?;
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok((name, data))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = RollcallProxy::new(&connection)
        .await
        .context("rollcalld is not reachable")?;

    match cli.command {
        Commands::Ingest { files } => {
            let uploads = read_uploads(&files)?;
            tracing::debug!(files = uploads.len(), "uploading");
            print_json(&proxy.ingest(uploads).await?);
        }
        Commands::Cancel => {
            proxy.cancel_ingest().await?;
            println!("Cancellation requested");
        }
        Commands::Photos => print_json(&proxy.list_photos().await?),
        Commands::Labels => print_json(&proxy.list_labels().await?),
        Commands::ByLabel { label } => print_json(&proxy.photos_by_label(&label).await?),
        Commands::Rename { from, to } => {
            proxy.rename_label(&from, &to).await?;
            println!("Renamed {from:?} to {to:?}");
        }
        Commands::Status => print_json(&proxy.status().await?),
    }

    Ok(())
}
