use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use redrive::{config::Config, message::PayloadFormat, service::Service, Error};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Redrive every message of a queue into a Lambda function.
    Drain {
        /// Name of the source queue.
        #[arg(long, env = "SQS_NAME")]
        queue: String,
        /// Name of the function to invoke with each message body.
        #[arg(long, env = "LAMBDA_NAME")]
        function: String,
        /// Leave messages enqueued after this run started in the queue.
        #[arg(long)]
        since_start: bool,
        /// How each body is sent to the function (`json` or `raw`).
        /// Overrides `REDRIVE_PAYLOAD_FORMAT`.
        #[arg(long)]
        payload_format: Option<PayloadFormat>,
    },
    /// Set an environment variable on a Lambda function.
    SetEnv {
        function: String,
        name: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    redrive::init_tracing()?;

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Command::Drain {
        payload_format: Some(payload_format),
        ..
    } = &cli.command
    {
        config.payload_format = *payload_format;
    }
    tracing::debug!(?config, "Loaded configuration");

    let service = Service::connect_with().config(config).call().await?;

    match cli.command {
        Command::Drain {
            queue,
            function,
            since_start,
            ..
        } => {
            let run_start_time = since_start.then(|| chrono::Utc::now().timestamp_millis());

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupted, stopping after the current batch");
                        cancel.cancel();
                    }
                }
            });

            tracing::info!(%queue, %function, ?run_start_time, "Starting redrive");

            let stats = match service
                .redrive(&queue, &function, run_start_time, &cancel)
                .await
            {
                Ok(stats) => stats,
                Err(Error::Receive {
                    endpoint,
                    source,
                    statistics,
                }) => {
                    println!("{}", serde_json::to_string_pretty(&statistics)?);
                    return Err(eyre::eyre!(
                        "Failed to receive messages from {endpoint}: {source}"
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::SetEnv {
            function,
            name,
            value,
        } => {
            let retries = service
                .set_environment_variable(&function, &name, &value)
                .await?;

            tracing::info!(%function, %name, retries, "Environment variable set");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_payload_format_flag() {
        let cli = Cli::try_parse_from([
            "redrive",
            "drain",
            "--queue",
            "orders-dlq",
            "--function",
            "orders-handler",
            "--payload-format",
            "raw",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Command::Drain {
                payload_format: Some(PayloadFormat::Raw),
                ..
            }
        ));

        assert!(Cli::try_parse_from([
            "redrive",
            "drain",
            "--queue",
            "orders-dlq",
            "--function",
            "orders-handler",
            "--payload-format",
            "xml",
        ])
        .is_err());
    }
}
