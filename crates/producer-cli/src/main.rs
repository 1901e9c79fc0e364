//! CLI binary to send requests and emit events through a courier producer.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_producer::{Headers, Producer, ProducerOptions, SendOptions, Transport};
use courier_producer_memory::{Delivery, MemoryBroker};
use courier_producer_nats::{NatsTransport, NatsTransportOptions};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed `--header` argument.
    #[error("invalid header `{0}`, expected key=value")]
    Header(String),

    /// Value argument is not JSON.
    #[error("invalid JSON value: {0}")]
    Json(#[from] serde_json::Error),

    /// Producer error
    #[error(transparent)]
    Producer(#[from] courier_producer::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// NATS server URL. Uses an in-process echo broker when unset.
    #[arg(long, env = "COURIER_NATS_URL")]
    nats_url: Option<String>,

    /// Reply topics to subscribe at startup
    #[arg(long, env = "COURIER_REPLY_TOPICS", value_delimiter = ',')]
    reply_topics: Vec<String>,

    /// Upper bound on every send and emit, in milliseconds
    #[arg(long, default_value_t = 30_000, env = "COURIER_TIMEOUT_MS")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Send a request and print the reply
    Send(Message),

    /// Emit an event without waiting for a reply
    Emit(Message),
}

#[derive(Clone, Debug, clap::Args)]
struct Message {
    /// Destination topic
    topic: String,

    /// JSON value to publish
    value: String,

    /// Header attached to the envelope, as key=value (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

impl Message {
    fn value(&self) -> Result<Value, Error> {
        Ok(serde_json::from_str(&self.value)?)
    }

    fn options(&self) -> Option<SendOptions> {
        if self.headers.is_empty() {
            return None;
        }

        Some(SendOptions::with_headers(
            self.headers.iter().cloned().collect::<Headers>(),
        ))
    }
}

fn parse_header(raw: &str) -> Result<(String, String), Error> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::Header(raw.to_string())),
    }
}

impl Args {
    fn producer_options(&self) -> ProducerOptions {
        ProducerOptions {
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Reply topics plus the destination of a `send`.
    fn bootstrap_topics(&self) -> Vec<String> {
        let mut topics = self.reply_topics.clone();
        if let Command::Send(message) = &self.command {
            topics.push(message.topic.clone());
        }
        topics
    }
}

async fn run<Tr>(producer: Producer<Tr>, args: &Args) -> Result<(), Error>
where
    Tr: Transport,
{
    producer.bootstrap(args.bootstrap_topics()).await?;

    match &args.command {
        Command::Send(message) => {
            let reply: Value = producer
                .send(&message.topic, message.value()?, message.options())
                .await?;
            println!("{reply}");
        }
        Command::Emit(message) => {
            producer
                .emit(&message.topic, message.value()?, message.options())
                .await?;
            info!(topic = %message.topic, "event emitted");
        }
    }

    Ok(())
}

/// Replies with `value`, or with its serialization error.
fn reply_or_error<T>(delivery: &Delivery, value: &T) -> bool
where
    T: Serialize,
{
    match delivery.reply(value) {
        Ok(delivered) => delivered,
        Err(e) => delivery.reply_error(e.to_string()),
    }
}

fn echo_broker(args: &Args) -> MemoryBroker {
    let broker = MemoryBroker::new();

    if let Command::Send(message) = &args.command {
        let mut deliveries = broker.consume(&message.topic);
        tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                match delivery.decode::<Value>() {
                    Ok(envelope) => {
                        reply_or_error(&delivery, envelope.value());
                    }
                    Err(e) => {
                        delivery.reply_error(e.to_string());
                    }
                }
            }
        });
    }

    broker
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let options = args.producer_options();

    match &args.nats_url {
        Some(url) => {
            let transport = NatsTransport::new(NatsTransportOptions {
                url: url.clone(),
                ..NatsTransportOptions::default()
            });
            run(Producer::new(transport, options), &args).await
        }
        None => {
            info!("no NATS URL configured, using in-process echo broker");
            let transport = echo_broker(&args).transport();
            run(Producer::new(transport, options), &args).await
        }
    }
}
