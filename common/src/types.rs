use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeReason {
    ColdBoot,
    SuspendWake,
}

impl WakeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ColdBoot => "COLD_BOOT",
            Self::SuspendWake => "SUSPEND_WAKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockSource {
    Network,
    Extrapolated,
    Unknown,
}

impl ClockSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Extrapolated => "EXTRAPOLATED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    ColdStart,
    WarmWake,
    Resyncing,
    Matching,
    Dispatching,
    Sleeping,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ColdStart => "COLD_START",
            Self::WarmWake => "WARM_WAKE",
            Self::Resyncing => "RESYNCING",
            Self::Matching => "MATCHING",
            Self::Dispatching => "DISPATCHING",
            Self::Sleeping => "SLEEPING",
        }
    }
}

/// What the appliance should be set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceCommand {
    pub power: bool,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: i32,
}
