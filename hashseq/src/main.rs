use clap::{Parser, Subcommand};
use dotmatics::{
    ClientConfig, ClientError, ConfigError, Credentials, DotmaticsClient, Environment,
    SampleCsvRow, pluck_field,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Query HashSeq experiment records from Dotmatics.
///
/// Credentials are read from DOTMATICS_USERNAME and DOTMATICS_PASSWORD.
#[derive(Parser, Debug)]
#[command(name = "hashseq")]
struct Cli {
    /// Config file, YAML (.yaml/.yml) or flat key=value lines
    #[arg(long, global = true, default_value = "../config.txt")]
    config: PathBuf,

    /// Environment to query: prod or test
    #[arg(long, global = true, default_value = "prod")]
    env: Environment,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
enum CliCommand {
    /// Print all five HashSeq data sources of an experiment as JSON
    Summary { experiment_id: String },
    /// Print the sample sheet lines of an experiment
    SampleCsv { experiment_id: String },
    /// Print the rows of a data source, looked up by name, as JSON
    Form {
        data_source_name: String,
        experiment_id: String,
        /// Only print this field of every row
        #[arg(long)]
        field: Option<String>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("could not serialize output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!("{e}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let config = ClientConfig::load(&cli.config, cli.env)?;
    let credentials = Credentials::from_env()?;

    tracing::info!(
        environment = %config.environment,
        server = %config.server_url,
        "Querying Dotmatics"
    );
    let client = DotmaticsClient::new(config, credentials)?;

    let output = match cli.command {
        CliCommand::Summary { experiment_id } => {
            let summary = client.get_experiment_summary(&experiment_id).await?;
            serde_json::to_string_pretty(&summary)?
        }
        CliCommand::SampleCsv { experiment_id } => {
            render_sample_csv(client.get_sample_csv_rows(&experiment_id).await?)
        }
        CliCommand::Form {
            data_source_name,
            experiment_id,
            field,
        } => {
            let rows = match field {
                Some(field) => {
                    client
                        .query_named_form(&data_source_name, &experiment_id, pluck_field(field))
                        .await?
                }
                None => {
                    client
                        .query_named_form(&data_source_name, &experiment_id, |rows| rows)
                        .await?
                }
            };
            serde_json::to_string_pretty(&rows)?
        }
    };

    Ok(output)
}

/// Sample sheet lines in a stable order.
fn render_sample_csv(rows: HashSet<SampleCsvRow>) -> String {
    let mut rows: Vec<SampleCsvRow> = rows.into_iter().collect();
    rows.sort();

    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
