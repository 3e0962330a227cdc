use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use tasmota_ir_bridge::bridge::HubEntry;
use std::time::Duration;
use tasmota_ir_bridge::config::{self, Config, HubConfig};
use tasmota_ir_bridge::entities::Entity;
use tasmota_ir_bridge::error::{BridgeError, Result};
use tasmota_ir_bridge::hub::CommandPublisher;
use tasmota_ir_bridge::input::mqtt::{LinkStatus, MqttClient, MqttIntegration};
use tasmota_ir_bridge::services::ServiceCall;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "tasmota-ir-bridge")]
#[command(about = "Bridge a Tasmota IR hub to sensor and switch entities")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until Ctrl+C (default)
    Run,
    /// Send a raw IR code through the hub
    Send {
        /// Raw code, passed to the hub verbatim
        code: String,
    },
    /// Put the hub into IR learn mode
    Learn,
    /// Validate the configuration and print it
    CheckConfig,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    // Before the runtime starts any threads
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command.unwrap_or(Commands::Run))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let config = Config::from_env()?;

    match command {
        Commands::CheckConfig => {
            info!("Configuration valid: {}", config.hub.title());
            info!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Send { code } => {
            one_shot(config, ServiceCall::SendIr { raw: code }).await
        }
        Commands::Learn => one_shot(config, ServiceCall::LearnIr).await,
        Commands::Run => run_bridge(config).await,
    }
}

/// Bound on each wait for the broker in one-shot commands.
const LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Set up the entry, invoke a single service and unload again.
async fn one_shot(config: Config, call: ServiceCall) -> Result<()> {
    if !config.hub.use_mqtt() {
        let entry = HubEntry::setup(config.hub, None).await?;
        let result = entry.call_service(call).await;
        entry.unload().await;
        return result;
    }

    let cancel = CancellationToken::new();
    let mqtt_client = MqttClient::new(&config.mqtt);
    let mut status = mqtt_client.link_status();
    let publisher: Arc<dyn CommandPublisher> = Arc::new(mqtt_client.client());
    let (tx, _rx) = mpsc::channel(1);
    let mqtt_task = tokio::spawn(mqtt_client.run(tx, cancel.clone()));

    let result = publish_once(config.hub, call, publisher, &mut status).await;

    // Stopping the loop sends the disconnect
    cancel.cancel();
    if let Err(e) = mqtt_task.await {
        warn!("MQTT event loop ended abnormally: {}", e);
    }
    result
}

/// Run one service over MQTT, waiting for the broker before and after.
///
/// The publish is only queued by the client, so the command counts as sent
/// once the event loop has written it out.
async fn publish_once(
    hub: HubConfig,
    call: ServiceCall,
    publisher: Arc<dyn CommandPublisher>,
    status: &mut watch::Receiver<LinkStatus>,
) -> Result<()> {
    wait_for_link(status, "connecting", |s| s.connections > 0).await?;

    let entry = HubEntry::setup(hub, Some(publisher)).await?;
    let sent_before = status.borrow().publishes_sent;
    let result = entry.call_service(call).await;
    let flushed = wait_for_link(status, "publishing", |s| s.publishes_sent > sent_before).await;
    entry.unload().await;

    result.and(flushed)
}

async fn wait_for_link(
    status: &mut watch::Receiver<LinkStatus>,
    what: &str,
    done: impl FnMut(&LinkStatus) -> bool,
) -> Result<()> {
    match tokio::time::timeout(LINK_TIMEOUT, status.wait_for(done)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(BridgeError::SetupFailed(format!(
            "MQTT event loop stopped before {}",
            what
        ))),
        Err(_) => {
            error!("[MQTT] Broker did not answer while {}", what);
            Err(BridgeError::Timeout(LINK_TIMEOUT))
        }
    }
}

async fn run_bridge(config: Config) -> Result<()> {
    info!("Starting Tasmota IR bridge");
    info!("  Hub: {}:{}", config.hub.host, config.hub.port);
    info!("  Transport: {}", config.hub.transport);
    info!("  Scan interval: {}s", config.hub.scan_interval_secs);

    let cancel = CancellationToken::new();
    let needs_broker = config.needs_broker();

    let mqtt_client = needs_broker.then(|| {
        info!(
            "  MQTT broker: {}:{}",
            config.mqtt.broker_host, config.mqtt.broker_port
        );
        MqttClient::new(&config.mqtt)
    });
    let publisher = mqtt_client
        .as_ref()
        .map(|c| Arc::new(c.client()) as Arc<dyn CommandPublisher>);

    let entry = HubEntry::setup(config.hub, publisher).await?;
    info!("{} ready", entry.title());
    info!("  - {} ({})", entry.sensor().name(), entry.sensor().unique_id());
    info!("  - {} ({})", entry.switch().name(), entry.switch().unique_id());
    let initial = entry.sensor().snapshot();
    info!(
        "{} starts as {}",
        entry.sensor().name(),
        initial.state.as_deref().unwrap_or("unavailable")
    );

    let mqtt_task = match mqtt_client {
        Some(mqtt_client) => Some(
            MqttIntegration::new(entry.coordinator().clone()).start(mqtt_client, cancel.child_token()),
        ),
        None => {
            warn!("No MQTT broker configured, IR readings will not be received");
            None
        }
    };

    let mut updates = entry.sensor().updates();
    let sensor_name = entry.sensor().name().to_string();
    let state_task = tokio::spawn(async move {
        while let Some(snapshot) = updates.next().await {
            info!(
                "{} -> {} {}",
                sensor_name,
                snapshot.state.as_deref().unwrap_or("unavailable"),
                snapshot.attributes
            );
        }
    });

    info!("Press Ctrl+C to exit");
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    cancel.cancel();
    if let Some(task) = mqtt_task {
        if let Err(e) = task.await {
            warn!("MQTT task ended abnormally: {}", e);
        }
    }
    entry.unload().await;
    state_task.abort();

    info!("Tasmota IR bridge stopped");
    Ok(())
}
