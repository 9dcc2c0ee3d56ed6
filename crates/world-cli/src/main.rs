use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use world_delivery::{queue_url, DeliveryConfig, DeliveryOutcome, DeliveryQueue, QueueParams, RetryPolicy};

#[derive(Parser)]
#[command(name = "world-cli", about = "Workflow world queue tooling")]
struct Cli {
    /// Destino base; por defecto `WORLD_DELIVER_TO`
    #[arg(long, global = true)]
    deliver_to: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push one message to the queue endpoint
    Deliver {
        #[arg(long)]
        queue: String,
        /// JSON body
        #[arg(long, default_value = "null")]
        message: String,
        #[arg(long, default_value_t = 1)]
        attempt: u32,
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long)]
        deployment_id: Option<String>,
        /// Single attempt, no bounded retry
        #[arg(long)]
        no_retry: bool,
        /// Stay alive for a receiver-requested redelivery
        #[arg(long)]
        follow: bool,
    },
    /// Print the endpoint a queue name resolves to
    QueueUrl {
        #[arg(long)]
        queue: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "world_delivery=info".into()))
                                  .with(tracing_subscriber::fmt::layer())
                                  .init();

    let cli = Cli::parse();
    let mut config = DeliveryConfig::from_env();
    if let Some(to) = cli.deliver_to {
        config = config.with_deliver_to(to);
    }

    match cli.command {
        Command::QueueUrl { queue } => {
            println!("{}", queue_url(&config.deliver_to, &queue)?);
        }
        Command::Deliver { queue,
                           message,
                           attempt,
                           message_id,
                           deployment_id,
                           no_retry,
                           follow, } => {
            let message: Value = serde_json::from_str(&message).context("--message is not valid JSON")?;
            if no_retry {
                config = config.with_retry(RetryPolicy::none());
            }
            let mut params = QueueParams::new(config.deliver_to.clone(), queue, message);
            params.attempt = attempt;
            params.message_id = message_id;
            params.deployment_id = deployment_id;

            let receipt = DeliveryQueue::from_config(&config)?.queue(params).await?;
            match receipt.outcome {
                DeliveryOutcome::Delivered => println!("delivered {}", receipt.message_id),
                DeliveryOutcome::Delayed { retry_in } => {
                    println!("delayed {} (retry in {:?})", receipt.message_id, retry_in);
                    if follow {
                        // la re-entrega corre en otra tarea; se le da tiempo para un intento
                        tokio::time::sleep(retry_in + config.http_timeout).await;
                    }
                }
            }
        }
    }
    Ok(())
}
