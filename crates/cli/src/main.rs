use std::path::PathBuf;

use anyhow::{anyhow, Context};
use catalog_app::catalog::{Catalog, Operation, Outcome, RawInput, RecordId};
use catalog_kernel::settings::Settings;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "catalog", version, about = "Library catalog service")]
struct Cli {
    /// Preload this JSON snapshot instead of the configured one
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server until Ctrl-C
    Serve,
    /// Print the catalog record counts
    Summary,
    /// Print the merged OpenAPI document
    Openapi,
    /// Run one catalog operation, e.g. `genre_create` or `work_detail`
    Dispatch {
        operation: String,
        #[arg(long)]
        id: Option<String>,
        /// Submission as a JSON object of strings or string lists
        #[arg(long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().with_context(|| "failed to load catalog settings")?;
    if let Some(snapshot) = cli.snapshot {
        settings.storage.snapshot_path = Some(snapshot);
    }

    match cli.command {
        Command::Serve => {
            catalog_telemetry::init(&settings.telemetry)?;
            catalog_app::serve(&settings).await
        }
        Command::Summary => {
            catalog_telemetry::init_stderr(&settings.telemetry)?;
            let catalog = Catalog::new(catalog_app::build_storage(&settings.storage).await?);
            let counts = catalog.counts().await?;
            tracing::info!(?counts, "catalog summary computed");
            print_json(&json!(counts))
        }
        Command::Openapi => {
            catalog_telemetry::init_stderr(&settings.telemetry)?;
            let storage = catalog_app::build_storage(&settings.storage).await?;
            let registry = catalog_app::build_registry(storage);
            print_json(&catalog_http::router::merged_openapi(&registry))
        }
        Command::Dispatch {
            operation,
            id,
            input,
        } => {
            catalog_telemetry::init_stderr(&settings.telemetry)?;
            let operation: Operation = operation.parse()?;
            tracing::info!(%operation, id = ?id, "dispatching catalog operation");
            let input: RawInput = match input {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| "--input must be a JSON object of strings or string lists")?,
                None => RawInput::new(),
            };
            let id = id.map(RecordId::from);

            let catalog = Catalog::new(catalog_app::build_storage(&settings.storage).await?);
            let outcome = catalog.perform(operation, &input, id.as_ref()).await;
            print_json(&describe(outcome)?)
        }
    }
}

/// JSON description of an outcome; internal errors fail the command.
fn describe(outcome: Outcome) -> anyhow::Result<Value> {
    Ok(match outcome {
        Outcome::Rendered { view, data } => json!({ "outcome": "rendered", "view": view, "data": data }),
        Outcome::Redirected(target) => {
            json!({ "outcome": "redirected", "location": target.url(), "target": target })
        }
        Outcome::NotFound => json!({ "outcome": "not_found" }),
        Outcome::ValidationFailed { draft, errors } => {
            json!({ "outcome": "validation_failed", "draft": draft, "errors": errors })
        }
        Outcome::IntegrityBlocked(dependents) => {
            json!({ "outcome": "integrity_blocked", "dependents": dependents })
        }
        Outcome::InternalError(err) => return Err(anyhow!(err).context("catalog operation failed")),
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
