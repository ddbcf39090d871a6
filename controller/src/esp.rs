use core::{
    convert::TryInto,
    ptr::{addr_of, addr_of_mut},
};
use std::{thread, time::Duration};

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use ir_schedule_common::{
    config::NetworkConfig, CycleController, FetchError, NodeConfig, RetainedBlob, RetentionError,
    RetentionStore, ScheduleSource, TimeSource, TimeSyncError, WakeReason, RETAINED_BLOB_LEN,
};

use crate::{
    fetch::EspDocumentFetcher,
    gree,
    ir::{init_ir_transmitter, IrTransmitter},
    ntp::SntpClient,
};

const NVS_NAMESPACE: &str = "irschedule";
const NVS_CONFIG_KEY: &str = "runtime_json";
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

// Lives in RTC slow memory: kept through deep sleep, reset from the image on
// power-on.
#[link_section = ".rtc.data"]
static mut RTC_REGION: RetainedBlob = [0; RETAINED_BLOB_LEN];

/// Retention backed by RTC slow memory.
struct RtcRetention;

/// WiFi-dependent collaborators. The radio is only brought up when the cycle
/// first asks for the network, so warm wakes without a resync stay offline.
struct EspNetwork {
    modem: Option<Modem>,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    config: NetworkConfig,
    wifi: Option<EspWifi<'static>>,
    link_failed: bool,
    time: SntpClient,
    schedule: EspDocumentFetcher,
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let wake = read_wake_reason();
    info!("woke: {}", wake.as_str());

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut config = nvs_store.load_node_config().unwrap_or_else(|err| {
        warn!("failed to load node config from NVS: {err:#}");
        NodeConfig::default()
    });
    ensure_wifi_defaults(&mut config.network);
    config.sanitize();

    if config.ir.carrier_khz != gree::CARRIER_KHZ {
        warn!(
            "IR carrier set to {}kHz, Gree remotes use {}kHz",
            config.ir.carrier_khz,
            gree::CARRIER_KHZ
        );
    }

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;
    let ir_sender = match init_ir_transmitter(rmt, &config.ir) {
        Ok(transmitter) => {
            info!(
                "IR transmitter initialized on RMT channel{} / GPIO{} @ {}kHz",
                config.ir.rmt_channel, config.ir.tx_pin, config.ir.carrier_khz
            );
            transmitter
        }
        Err(err) => {
            warn!("failed to initialize IR transmitter, running disabled: {err:#}");
            IrTransmitter::disabled()
        }
    };

    let network = EspNetwork {
        modem: Some(modem),
        sys_loop,
        nvs_partition,
        config: config.network.clone(),
        wifi: None,
        link_failed: false,
        time: SntpClient::new(&config.ntp),
        schedule: EspDocumentFetcher::new(config.schedule_url()),
    };

    let mut controller =
        CycleController::new(config.cycle_config(), RtcRetention, network, ir_sender);
    let report = controller.run_cycle(wake);

    match serde_json::to_string(&report) {
        Ok(json) => info!("cycle report: {json}"),
        Err(err) => warn!("failed to serialize cycle report: {err}"),
    }

    let (_, network, ir_sender) = controller.into_parts();
    info!("IR frames sent this wake: {}", ir_sender.sent_frames());
    network.shutdown();

    enter_deep_sleep(report.suspend_for())
}

fn read_wake_reason() -> WakeReason {
    let reason = unsafe { esp_idf_svc::sys::esp_reset_reason() };
    if reason == esp_idf_svc::sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP {
        WakeReason::SuspendWake
    } else {
        WakeReason::ColdBoot
    }
}

fn enter_deep_sleep(duration: Duration) -> ! {
    let micros: u64 = duration.as_micros().try_into().unwrap_or(u64::MAX);
    info!("entering deep sleep for {}s", duration.as_secs());
    unsafe { esp_idf_svc::sys::esp_deep_sleep(micros) }
}

fn ensure_wifi_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            network.wifi_ssid = ssid.to_string();
        }
    }

    if network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            network.wifi_pass = pass.to_string();
        }
    }
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    let ssid = network.wifi_ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if !has_station_credentials(network) {
        return Err(anyhow!("wifi credentials missing"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    if let Some(err) = last_err {
        let _ = wifi.stop();
        return Err(err).context("all wifi connect attempts failed");
    }

    drop(wifi);
    Ok(esp_wifi)
}

impl RetentionStore for RtcRetention {
    fn load(&mut self) -> RetainedBlob {
        unsafe { addr_of!(RTC_REGION).read_volatile() }
    }

    fn save(&mut self, blob: &RetainedBlob) -> Result<(), RetentionError> {
        unsafe { addr_of_mut!(RTC_REGION).write_volatile(*blob) };
        Ok(())
    }
}

impl EspNetwork {
    fn ensure_link(&mut self) -> anyhow::Result<()> {
        if self.wifi.is_some() {
            return Ok(());
        }
        if self.link_failed {
            return Err(anyhow!("wifi unavailable this wake"));
        }

        let modem = self
            .modem
            .take()
            .ok_or_else(|| anyhow!("wifi modem already consumed"))?;
        match connect_wifi(
            modem,
            self.sys_loop.clone(),
            self.nvs_partition.clone(),
            &self.config,
        ) {
            Ok(wifi) => {
                self.wifi = Some(wifi);
                Ok(())
            }
            Err(err) => {
                self.link_failed = true;
                Err(err)
            }
        }
    }

    fn shutdown(self) {
        if let Some(mut wifi) = self.wifi {
            if let Err(err) = wifi.stop() {
                warn!("failed to stop wifi before sleep: {err:?}");
            }
        }
    }
}

impl TimeSource for EspNetwork {
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError> {
        self.ensure_link()
            .map_err(|err| TimeSyncError::Unreachable(format!("{err:#}")))?;
        self.time.fetch_network_time()
    }
}

impl ScheduleSource for EspNetwork {
    fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
        self.ensure_link()
            .map_err(|err| FetchError::Transport(format!("{err:#}")))?;
        self.schedule.fetch_schedule_document()
    }
}

impl NvsStore {
    fn load_node_config(&self) -> anyhow::Result<NodeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<NodeConfig>(value)?),
            None => Ok(NodeConfig::default()),
        }
    }
}
