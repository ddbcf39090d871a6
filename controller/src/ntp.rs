use std::{
    io::ErrorKind,
    net::{ToSocketAddrs, UdpSocket},
    thread,
    time::Duration,
};

use ir_schedule_common::{config::NtpConfig, TimeSource, TimeSyncError};

#[cfg(feature = "esp32")]
use log::{debug, warn};
#[cfg(not(feature = "esp32"))]
use tracing::{debug, warn};

const PACKET_LEN: usize = 48;
const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;
const NTP_TO_UNIX_SECS: i64 = 2_208_988_800;
const RETRY_DELAY_MS: u64 = 200;

/// Minimal SNTP client with a fixed number of attempts.
pub struct SntpClient {
    server: String,
    attempts: u32,
    timeout: Duration,
}

impl SntpClient {
    pub fn new(config: &NtpConfig) -> Self {
        Self {
            server: config.server.clone(),
            attempts: config.attempts.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn query_once(&self) -> Result<i64, TimeSyncError> {
        let addr = self
            .server
            .to_socket_addrs()
            .map_err(|err| TimeSyncError::Unreachable(format!("{}: {err}", self.server)))?
            .next()
            .ok_or_else(|| TimeSyncError::Unreachable(format!("{}: no address", self.server)))?;

        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|err| TimeSyncError::Unreachable(err.to_string()))?;
        socket
            .set_read_timeout(Some(self.timeout))
            .map_err(|err| TimeSyncError::Unreachable(err.to_string()))?;
        socket
            .send_to(&build_request(), addr)
            .map_err(|err| TimeSyncError::Unreachable(err.to_string()))?;

        let mut response = [0_u8; PACKET_LEN];
        let (len, _) = socket.recv_from(&mut response).map_err(|err| {
            if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                TimeSyncError::Timeout { attempts: 1 }
            } else {
                TimeSyncError::Unreachable(err.to_string())
            }
        })?;

        parse_response(&response[..len])
    }
}

impl TimeSource for SntpClient {
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError> {
        let mut last_err = TimeSyncError::Timeout {
            attempts: self.attempts,
        };

        for attempt in 1..=self.attempts {
            match self.query_once() {
                Ok(epoch) => {
                    debug!("sntp reply from {} on attempt {attempt}: {epoch}", self.server);
                    return Ok(epoch);
                }
                Err(TimeSyncError::Timeout { .. }) => {
                    warn!("sntp attempt {attempt}/{} timed out", self.attempts);
                    last_err = TimeSyncError::Timeout {
                        attempts: self.attempts,
                    };
                }
                Err(err) => {
                    warn!("sntp attempt {attempt}/{} failed: {err}", self.attempts);
                    last_err = err;
                }
            }

            if attempt < self.attempts {
                thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            }
        }

        Err(last_err)
    }
}

/// Client request: LI unsynchronized, version 4, mode client.
pub fn build_request() -> [u8; PACKET_LEN] {
    let mut packet = [0_u8; PACKET_LEN];
    packet[0] = 0b1110_0011;
    packet[2] = 6;
    packet[3] = 0xEC;
    packet[12..16].copy_from_slice(&[49, 0x4E, 49, 52]);
    packet
}

/// Unix seconds from the server's transmit timestamp.
pub fn parse_response(packet: &[u8]) -> Result<i64, TimeSyncError> {
    if packet.len() < PACKET_LEN {
        return Err(TimeSyncError::Malformed("short packet"));
    }

    let mode = packet[0] & 0b111;
    if mode != 4 && mode != 5 {
        return Err(TimeSyncError::Malformed("not a server reply"));
    }

    let mut seconds = [0_u8; 4];
    seconds.copy_from_slice(&packet[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4]);
    let since_1900 = u32::from_be_bytes(seconds);
    if since_1900 == 0 {
        return Err(TimeSyncError::Malformed("zero transmit timestamp"));
    }

    Ok(i64::from(since_1900) - NTP_TO_UNIX_SECS)
}
