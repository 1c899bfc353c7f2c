//! envtest-router: listen for test requests, or publish one.

use anyhow::Context;
use clap::{Parser, Subcommand};
use envtest_router::config::{Config, ProjectSource};
use envtest_router::db::{CreateSubscription, Db};
use envtest_router::dispatch::TestDispatcher;
use envtest_router::logsink::TracingLogSink;
use envtest_router::model::{NewMessage, TopicName};
use envtest_router::subscriber::{PgmqBackend, Subscriber, SubscriberConfig, Termination};
use envtest_router::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "envtest-router",
    about = "Run test actions requested over a message queue"
)]
struct Cli {
    /// Defaults to `listen`, driven entirely by environment variables.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Subscribe and dispatch test requests until the listen timeout
    Listen,
    /// Publish a test request to the configured topic
    Publish {
        /// Test name (e.g. simpleLog)
        test: String,
        /// Message attribute as key=value; repeatable
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Topic id, overriding PUBSUB_TOPIC
        #[arg(long)]
        topic: Option<String>,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "envtest-router".to_string(),
        default_level: config.log_level.clone(),
    })?;

    if config.project_source == ProjectSource::Default {
        warn!(
            project = %config.project_id,
            "no project configured; set GOOGLE_CLOUD_PROJECT or GOOGLE_APPLICATION_CREDENTIALS"
        );
    }

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => cmd_listen(&config).await,
        Command::Publish {
            test,
            attributes,
            topic,
        } => cmd_publish(&config, test, attributes, topic).await,
    }
}

async fn cmd_listen(config: &Config) -> anyhow::Result<()> {
    if !config.enable_subscriber {
        info!("subscriber disabled; set ENABLE_SUBSCRIBER=true to listen");
        return Ok(());
    }

    let db = Arc::new(connect(config).await?);
    let topic = config.topic_name()?;
    let name = config.subscription_name()?;

    let subscription = match db
        .create_subscription(&name, &topic, config.ack_deadline_seconds)
        .await?
    {
        CreateSubscription::Created(info) => {
            info!(subscription = %info.name, topic = %info.topic, "subscription created");
            info
        }
        CreateSubscription::Existing(info) => {
            info!(subscription = %info.name, topic = %info.topic, "reusing existing subscription");
            info
        }
    };

    let dispatcher = TestDispatcher::with_default_tests(Arc::new(TracingLogSink));
    let backend = PgmqBackend::new(Arc::clone(&db), &subscription, config.nack_delay_seconds);
    let subscriber = Subscriber::new(
        name.to_string(),
        Arc::new(backend),
        Arc::new(dispatcher),
        SubscriberConfig {
            max_messages: config.max_messages,
            poll_interval: config.poll_interval,
        },
    );

    let handle = subscriber.start();
    let stopper = handle.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        stopper.stop();
    });

    let termination = handle.await_terminated(config.listen_timeout).await?;
    let stats = termination.stats();
    match termination {
        Termination::Stopped(_) => info!(?stats, "stopped on request"),
        Termination::TimedOut(_) => info!(?stats, "listen window elapsed"),
    }

    db.close().await;
    Ok(())
}

async fn cmd_publish(
    config: &Config,
    test: String,
    attributes: Vec<(String, String)>,
    topic: Option<String>,
) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let topic = TopicName::new(
        &config.project_id,
        topic.as_deref().unwrap_or(&config.topic_id),
    )?;

    let message = attributes
        .into_iter()
        .fold(NewMessage::text(&test), |msg, (k, v)| msg.attribute(k, v));
    let ids = db.publish(&topic, &message).await?;

    if ids.is_empty() {
        println!("Published to {topic}: no subscriptions, message dropped");
    } else {
        println!("Published to {topic}: {} subscription(s), ids {ids:?}", ids.len());
    }
    db.close().await;
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let url = config.require_database_url()?;
    let db = Db::connect(url.expose_secret())
        .await
        .context("connecting to the queue database")?;
    db.migrate().await?;
    Ok(db)
}
