use serde::{Deserialize, Serialize};

use crate::clock::{LocalZone, MAX_OFFSET_MINUTES};

pub const DEFAULT_SCHEDULE_BASE_URL: &str =
    "https://raw.githubusercontent.com/davidhampgonsalves/IR-Schedule-Thermostat/master/schedules";

/// Parameters the cycle controller needs; everything else in
/// [`NodeConfig`] belongs to the adapters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleConfig {
    pub max_sleep_minutes: u32,
    pub sync_interval_secs: u32,
    pub zone: LocalZone,
}

impl Default for CycleConfig {
    fn default() -> Self {
        NodeConfig::default().cycle_config()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NtpConfig {
    pub server: String,
    pub attempts: u32,
    pub timeout_ms: u64,
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            server: "time.nist.gov:123".to_string(),
            attempts: 3,
            timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    #[serde(default)]
    pub mqtt_user: String,
    #[serde(default)]
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrHardwareConfig {
    pub tx_pin: i32,
    pub rmt_channel: u8,
    pub carrier_khz: u32,
}

impl Default for IrHardwareConfig {
    fn default() -> Self {
        Self {
            tx_pin: 4,
            rmt_channel: 0,
            carrier_khz: 38,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub node_id: u32,
    #[serde(default)]
    pub schedule_url: Option<String>,
    pub max_sleep_minutes: u32,
    pub sync_interval_secs: u32,
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub ntp: NtpConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub ir: IrHardwareConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            schedule_url: None,
            max_sleep_minutes: 70,
            sync_interval_secs: 24 * 60 * 60,
            utc_offset_minutes: -4 * 60,
            timezone: None,
            ntp: NtpConfig::default(),
            network: NetworkConfig::default(),
            ir: IrHardwareConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn sanitize(&mut self) {
        self.max_sleep_minutes = self.max_sleep_minutes.clamp(1, 24 * 60);
        self.sync_interval_secs = self.sync_interval_secs.max(60 * 60);
        self.utc_offset_minutes = self
            .utc_offset_minutes
            .clamp(-MAX_OFFSET_MINUTES, MAX_OFFSET_MINUTES);

        if self
            .timezone
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            self.timezone = None;
        }
        if self
            .schedule_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            self.schedule_url = None;
        }

        self.ntp.sanitize();
        self.ir.sanitize();
    }

    pub fn schedule_url(&self) -> String {
        self.schedule_url
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_SCHEDULE_BASE_URL}/{}.json", self.node_id))
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            max_sleep_minutes: self.max_sleep_minutes,
            sync_interval_secs: self.sync_interval_secs,
            zone: LocalZone::resolve(self.timezone.as_deref(), self.utc_offset_minutes),
        }
    }
}

impl NtpConfig {
    pub fn sanitize(&mut self) {
        if self.server.trim().is_empty() {
            self.server = Self::default().server;
        }
        self.attempts = self.attempts.clamp(1, 10);
        self.timeout_ms = self.timeout_ms.clamp(100, 10_000);
    }
}

impl IrHardwareConfig {
    pub fn sanitize(&mut self) {
        if self.tx_pin < 0 {
            self.tx_pin = 4;
        }

        if self.rmt_channel > 7 {
            self.rmt_channel = 0;
        }

        self.carrier_khz = self.carrier_khz.clamp(10, 100);
    }
}
