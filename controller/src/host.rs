use std::{io::ErrorKind, path::PathBuf, time::Duration};

use anyhow::Context;
use chrono::DateTime;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tracing::{info, warn};

use ir_schedule_common::{
    cycle_topic, status_topic, ApplianceCommand, CommandEmitter, CycleController, CycleReport,
    DispatchError, FetchError, NodeConfig, ScheduleSource, TimeSource, TimeSyncError, WakeReason,
};

use crate::{fetch::DocumentFetcher, gree, ntp::SntpClient, retention_file::FileRetention};

const MAX_TIME_SCALE: u32 = 3_600;

struct AppStore {
    config_path: PathBuf,
    retention_path: PathBuf,
}

/// Time and schedule collaborators reached over the host's network.
struct HostNetwork {
    time: SntpClient,
    schedule: DocumentFetcher,
}

struct MqttEmitter {
    mqtt: AsyncClient,
    topic: String,
}

#[derive(Debug, Serialize)]
struct CommandMessage {
    #[serde(flatten)]
    command: ApplianceCommand,
    #[serde(rename = "greeState")]
    gree_state: String,
}

#[derive(Debug, Serialize)]
struct NodeStatus<'a> {
    online: bool,
    #[serde(rename = "scheduleUrl")]
    schedule_url: &'a str,
    #[serde(rename = "timeScale")]
    time_scale: u32,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut config = store.load_node_config().await.unwrap_or_else(|err| {
        warn!("failed to load node config from store: {err:#}");
        NodeConfig::default()
    });
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let time_scale = parse_time_scale(std::env::var("TIME_SCALE").ok().as_deref());
    let schedule_url = config.schedule_url();
    info!(
        "node {} starting: schedule=`{schedule_url}`, mqtt=`{}:{}`, time scale x{time_scale}",
        config.node_id, config.network.mqtt_host, config.network.mqtt_port
    );

    let mut mqtt_options = MqttOptions::new(
        format!("ir-schedule-node-{}", config.node_id),
        config.network.mqtt_host.clone(),
        config.network.mqtt_port,
    );
    if !config.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            config.network.mqtt_user.clone(),
            config.network.mqtt_pass.clone(),
        );
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    spawn_mqtt_loop(eventloop);

    let status = NodeStatus {
        online: true,
        schedule_url: &schedule_url,
        time_scale,
    };
    if let Err(err) = publish_json(&mqtt, status_topic(config.node_id), &status).await {
        warn!("failed to publish node status: {err:#}");
    }

    let retention = FileRetention::new(store.retention_path.clone());
    retention
        .clear()
        .with_context(|| format!("failed to reset {}", retention.path().display()))?;

    let network = HostNetwork {
        time: SntpClient::new(&config.ntp),
        schedule: DocumentFetcher::new(&schedule_url),
    };
    let emitter = MqttEmitter {
        mqtt: mqtt.clone(),
        topic: ir_schedule_common::command_topic(config.node_id),
    };

    let mut controller = CycleController::new(config.cycle_config(), retention, network, emitter);
    let report_topic = cycle_topic(config.node_id);
    let mut wake = WakeReason::ColdBoot;

    loop {
        let (returned, report) = tokio::task::spawn_blocking(move || {
            let report = controller.run_cycle(wake);
            (controller, report)
        })
        .await
        .context("cycle task panicked")?;
        controller = returned;

        log_report(&report);
        if let Err(err) = publish_json(&mqtt, report_topic.clone(), &report).await {
            warn!("failed to publish cycle report: {err:#}");
        }

        let pause = scaled(report.suspend_for(), time_scale);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, leaving simulated suspend");
                break;
            }
        }
        wake = WakeReason::SuspendWake;
    }

    // The blocking HTTP client must not be dropped on a runtime worker.
    tokio::task::spawn_blocking(move || drop(controller))
        .await
        .context("shutdown task panicked")?;

    let offline = NodeStatus {
        online: false,
        schedule_url: &schedule_url,
        time_scale,
    };
    if let Err(err) = publish_json(&mqtt, status_topic(config.node_id), &offline).await {
        warn!("failed to publish node status: {err:#}");
    }
    Ok(())
}

fn spawn_mqtt_loop(mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn publish_json<T: Serialize>(
    mqtt: &AsyncClient,
    topic: String,
    value: &T,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(value)?;
    mqtt.publish(topic, QoS::AtLeastOnce, false, payload).await?;
    Ok(())
}

fn log_report(report: &CycleReport) {
    let wake_at = DateTime::from_timestamp(
        report.clock.now_epoch + i64::from(report.sleep_secs),
        0,
    );
    match (report.local_time, wake_at) {
        (Some(local), Some(wake_at)) if report.clock.source.is_usable() => info!(
            "cycle at {local} local ({}), next wake {} UTC",
            report.clock.source.as_str(),
            wake_at.format("%Y-%m-%d %H:%M")
        ),
        _ => info!(
            "cycle without a usable clock, next wake in {} minutes",
            report.sleep_secs / 60
        ),
    }

    for fault in &report.faults {
        warn!("cycle degraded: {fault:?}");
    }
}

fn apply_overrides(config: &mut NodeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        config.network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        config.network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        config.network.mqtt_pass = pass;
    }
    if let Some(url) = lookup("SCHEDULE_URL") {
        config.schedule_url = Some(url);
    }
}

fn parse_time_scale(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_TIME_SCALE)
}

fn scaled(suspend: Duration, time_scale: u32) -> Duration {
    suspend / time_scale.max(1)
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("IR_SCHEDULE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.ir-schedule"));

        Self {
            config_path: data_dir.join("runtime.json"),
            retention_path: data_dir.join("retention.bin"),
        }
    }

    async fn load_node_config(&self) -> anyhow::Result<NodeConfig> {
        match tokio::fs::read(&self.config_path).await {
            Ok(raw) => Ok(serde_json::from_slice::<NodeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(NodeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

impl TimeSource for HostNetwork {
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError> {
        self.time.fetch_network_time()
    }
}

impl ScheduleSource for HostNetwork {
    fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
        self.schedule.fetch_schedule_document()
    }
}

impl CommandEmitter for MqttEmitter {
    fn emit(&mut self, command: ApplianceCommand) -> Result<(), DispatchError> {
        let state = gree::encode_state(command)?;
        let message = CommandMessage {
            command,
            gree_state: gree::hex(&state),
        };
        let payload =
            serde_json::to_vec(&message).map_err(|err| DispatchError::Transmit(err.to_string()))?;

        self.mqtt
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .map_err(|err| DispatchError::Transmit(err.to_string()))?;
        info!("published {} to {}", message.gree_state, self.topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn env_overrides_replace_stored_values() {
        let env = HashMap::from([
            ("MQTT_HOST", "broker.lan"),
            ("MQTT_PORT", "not-a-port"),
            ("SCHEDULE_URL", "./schedules/2.json"),
        ]);
        let mut config = NodeConfig::default();

        apply_overrides(&mut config, |key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.network.mqtt_host, "broker.lan");
        assert_eq!(config.network.mqtt_port, 1883);
        assert_eq!(config.schedule_url(), "./schedules/2.json");
    }

    #[test]
    fn time_scale_is_bounded() {
        assert_eq!(parse_time_scale(None), 1);
        assert_eq!(parse_time_scale(Some("0")), 1);
        assert_eq!(parse_time_scale(Some(" 60 ")), 60);
        assert_eq!(parse_time_scale(Some("999999")), MAX_TIME_SCALE);
        assert_eq!(scaled(Duration::from_secs(4_200), 60), Duration::from_secs(70));
    }

    #[test]
    fn command_message_flattens_command() {
        let command = ApplianceCommand {
            power: true,
            target_temperature: 21,
        };
        let message = CommandMessage {
            command,
            gree_state: gree::hex(&gree::encode_state(command).unwrap()),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "power": true,
                "targetTemperature": 21,
                "greeState": "0c056050004000f0",
            })
        );
    }
}
