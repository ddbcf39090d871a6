use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use esp_idf_hal::{
    gpio::{AnyOutputPin, OutputPin},
    peripheral::Peripheral,
    rmt::{
        config::{CarrierConfig, DutyPercent, TransmitConfig},
        PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver, VariableLengthSignal, RMT,
    },
    units::FromValueType,
};
use log::{info, warn};

use ir_schedule_common::{config::IrHardwareConfig, ApplianceCommand, CommandEmitter, DispatchError};

use crate::gree;

// 80 MHz APB / 80 gives 1 µs ticks, so Gree timings map directly.
const IR_TICK_DIVIDER: u8 = 80;
const IR_REPEAT_COUNT: usize = 2;
const IR_REPEAT_GAP_MS: u64 = 50;
const MIN_SEND_INTERVAL_MS: u64 = 300;

enum IrBackend {
    Rmt(TxRmtDriver<'static>),
    Disabled,
}

/// Gree remote emulation on an RMT channel.
pub struct IrTransmitter {
    backend: IrBackend,
    last_send: Option<Instant>,
    sent_frames: u64,
}

impl IrTransmitter {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
        carrier_khz: u32,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let carrier = CarrierConfig::new()
            .frequency(carrier_khz.kHz().into())
            .carrier_level(PinState::High)
            .duty_percent(DutyPercent::new(33)?);

        let config = TransmitConfig::new()
            .clock_divider(IR_TICK_DIVIDER)
            .carrier(Some(carrier))
            .idle(Some(PinState::Low));

        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT IR driver")?;

        Ok(Self {
            backend: IrBackend::Rmt(tx),
            last_send: None,
            sent_frames: 0,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: IrBackend::Disabled,
            last_send: None,
            sent_frames: 0,
        }
    }

    pub fn sent_frames(&self) -> u64 {
        self.sent_frames
    }

    fn send_raw(&mut self, raw: &[u16]) -> anyhow::Result<()> {
        if raw.is_empty() {
            return Ok(());
        }

        let IrBackend::Rmt(tx) = &mut self.backend else {
            return Err(anyhow!("IR transmitter disabled"));
        };

        if let Some(last) = self.last_send {
            let elapsed = last.elapsed();
            let min_interval = Duration::from_millis(MIN_SEND_INTERVAL_MS);
            if elapsed < min_interval {
                thread::sleep(min_interval - elapsed);
            }
        }

        let mut pulses = Vec::with_capacity(raw.len());
        for (index, duration) in raw.iter().enumerate() {
            let level = if index % 2 == 0 {
                PinState::High
            } else {
                PinState::Low
            };

            pulses.push(Pulse::new(
                level,
                PulseTicks::new(*duration).context("invalid IR pulse duration")?,
            ));
        }

        let pulse_refs: Vec<&Pulse> = pulses.iter().collect();
        let mut signal = VariableLengthSignal::with_capacity(pulses.len());
        signal
            .push(pulse_refs)
            .context("failed to convert IR timings to RMT signal")?;

        for repeat in 0..IR_REPEAT_COUNT {
            tx.start_blocking(&signal)
                .context("failed to transmit IR frame over RMT")?;
            if repeat + 1 < IR_REPEAT_COUNT {
                thread::sleep(Duration::from_millis(IR_REPEAT_GAP_MS));
            }
        }

        self.last_send = Some(Instant::now());
        self.sent_frames = self.sent_frames.saturating_add(1);
        Ok(())
    }
}

impl CommandEmitter for IrTransmitter {
    fn emit(&mut self, command: ApplianceCommand) -> Result<(), DispatchError> {
        if matches!(self.backend, IrBackend::Disabled) {
            warn!("IR disabled, dropping command");
            return Err(DispatchError::Transmit("IR transmitter disabled".to_string()));
        }

        let state = gree::encode_state(command)?;
        self.send_raw(&gree::timings(&state))
            .map_err(|err| DispatchError::Transmit(format!("{err:#}")))?;
        info!("sent gree frame {}", gree::hex(&state));
        Ok(())
    }
}

pub fn init_ir_transmitter(rmt: RMT, ir: &IrHardwareConfig) -> anyhow::Result<IrTransmitter> {
    if ir.tx_pin < 0 {
        return Err(anyhow!("invalid tx pin: {}", ir.tx_pin));
    }

    let pin = ir.tx_pin;
    let carrier_khz = ir.carrier_khz;

    match ir.rmt_channel {
        0 => unsafe { IrTransmitter::new(rmt.channel0, AnyOutputPin::new(pin), carrier_khz) },
        1 => unsafe { IrTransmitter::new(rmt.channel1, AnyOutputPin::new(pin), carrier_khz) },
        2 => unsafe { IrTransmitter::new(rmt.channel2, AnyOutputPin::new(pin), carrier_khz) },
        3 => unsafe { IrTransmitter::new(rmt.channel3, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        4 => unsafe { IrTransmitter::new(rmt.channel4, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        5 => unsafe { IrTransmitter::new(rmt.channel5, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        6 => unsafe { IrTransmitter::new(rmt.channel6, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        7 => unsafe { IrTransmitter::new(rmt.channel7, AnyOutputPin::new(pin), carrier_khz) },
        _ => Err(anyhow!("unsupported RMT channel: {}", ir.rmt_channel)),
    }
}
