//! Gree YAA remote protocol: 8-byte state frames and their IR timings.

use ir_schedule_common::{ApplianceCommand, DispatchError};

pub const CARRIER_KHZ: u32 = 38;
pub const MIN_TEMP_C: i32 = 16;
pub const MAX_TEMP_C: i32 = 30;
pub const STATE_LEN: usize = 8;

const HDR_MARK_US: u16 = 9_000;
const HDR_SPACE_US: u16 = 4_500;
const BIT_MARK_US: u16 = 620;
const ONE_SPACE_US: u16 = 1_600;
const ZERO_SPACE_US: u16 = 540;
const MSG_SPACE_US: u16 = 19_980;

const FOOTER: u8 = 0b010;
const FOOTER_BITS: usize = 3;

pub type GreeState = [u8; STATE_LEN];

// Mode heat, fan auto, light on; byte 1 carries the temperature offset.
const HEAT_TEMPLATE: GreeState = [0x0C, 0x00, 0x60, 0x50, 0x00, 0x40, 0x00, 0x00];
const OFF_STATE: GreeState = [0x44, 0x05, 0x20, 0x50, 0x01, 0x40, 0x00, 0x70];

pub fn encode_state(command: ApplianceCommand) -> Result<GreeState, DispatchError> {
    if !command.power {
        return Ok(OFF_STATE);
    }

    let target = command.target_temperature;
    if !(MIN_TEMP_C..=MAX_TEMP_C).contains(&target) {
        return Err(DispatchError::Unsupported(format!(
            "target {target}C outside {MIN_TEMP_C}..={MAX_TEMP_C}C"
        )));
    }

    let mut state = HEAT_TEMPLATE;
    state[1] = (target - MIN_TEMP_C) as u8;
    state[7] = (checksum(&state) << 4) | (state[7] & 0x0F);
    Ok(state)
}

/// Block checksum nibble over the first seven bytes.
pub fn checksum(state: &GreeState) -> u8 {
    let low = state[..4].iter().map(|byte| byte & 0x0F);
    let high = state[4..7].iter().map(|byte| byte >> 4);
    low.chain(high).fold(10_u8, u8::wrapping_add) & 0x0F
}

/// Alternating mark/space durations in microseconds, starting with a mark.
///
/// The frame is sent as two blocks: header plus the first four bytes and a
/// three-bit footer, then a message gap and the remaining four bytes. Bytes go
/// out least significant bit first.
pub fn timings(state: &GreeState) -> Vec<u16> {
    let mut raw = Vec::with_capacity(2 + 2 * (STATE_LEN * 8 + FOOTER_BITS) + 4);
    raw.extend([HDR_MARK_US, HDR_SPACE_US]);

    for byte in &state[..4] {
        push_bits(&mut raw, *byte, 8);
    }
    push_bits(&mut raw, FOOTER, FOOTER_BITS);
    raw.extend([BIT_MARK_US, MSG_SPACE_US]);

    for byte in &state[4..] {
        push_bits(&mut raw, *byte, 8);
    }
    raw.extend([BIT_MARK_US, MSG_SPACE_US]);
    raw
}

pub fn hex(state: &GreeState) -> String {
    state.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn push_bits(raw: &mut Vec<u16>, value: u8, bits: usize) {
    for bit in 0..bits {
        let space = if value >> bit & 1 == 1 {
            ONE_SPACE_US
        } else {
            ZERO_SPACE_US
        };
        raw.extend([BIT_MARK_US, space]);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn heat(target_temperature: i32) -> ApplianceCommand {
        ApplianceCommand {
            power: true,
            target_temperature,
        }
    }

    #[test]
    fn heat_frames_match_captured_remote() {
        let expected_check = [0xA0, 0xB0, 0xC0, 0xD0, 0xE0, 0xF0, 0x00];

        for (offset, check) in expected_check.into_iter().enumerate() {
            let state = encode_state(heat(MIN_TEMP_C + offset as i32)).unwrap();
            assert_eq!(
                state,
                [0x0C, offset as u8, 0x60, 0x50, 0x00, 0x40, 0x00, check]
            );
        }
    }

    #[test]
    fn off_frame_ignores_temperature() {
        let off = ApplianceCommand {
            power: false,
            target_temperature: 99,
        };

        let state = encode_state(off).unwrap();

        assert_eq!(state, OFF_STATE);
        assert_eq!(checksum(&state), state[7] >> 4);
    }

    #[test]
    fn out_of_range_targets_are_unsupported() {
        assert!(matches!(
            encode_state(heat(15)),
            Err(DispatchError::Unsupported(_))
        ));
        assert!(matches!(
            encode_state(heat(31)),
            Err(DispatchError::Unsupported(_))
        ));
        assert!(encode_state(heat(MAX_TEMP_C)).is_ok());
    }

    #[test]
    fn timings_follow_two_block_layout() {
        let state = encode_state(heat(21)).unwrap();
        let raw = timings(&state);

        assert_eq!(raw.len(), 2 + 2 * 32 + 2 * 3 + 2 + 2 * 32 + 2);
        assert_eq!(&raw[..2], &[HDR_MARK_US, HDR_SPACE_US]);
        // 0x0C, LSB first: 0 0 1 1 0 0 0 0
        let first_spaces: Vec<u16> = raw[2..18].iter().skip(1).step_by(2).copied().collect();
        assert_eq!(
            first_spaces,
            vec![
                ZERO_SPACE_US,
                ZERO_SPACE_US,
                ONE_SPACE_US,
                ONE_SPACE_US,
                ZERO_SPACE_US,
                ZERO_SPACE_US,
                ZERO_SPACE_US,
                ZERO_SPACE_US,
            ]
        );
        // footer 0b010 then the inter-block gap
        assert_eq!(
            &raw[66..74],
            &[
                BIT_MARK_US,
                ZERO_SPACE_US,
                BIT_MARK_US,
                ONE_SPACE_US,
                BIT_MARK_US,
                ZERO_SPACE_US,
                BIT_MARK_US,
                MSG_SPACE_US,
            ]
        );
        assert!(raw.iter().step_by(2).skip(1).all(|mark| *mark == BIT_MARK_US));
    }

    #[test]
    fn hex_renders_frame() {
        assert_eq!(hex(&OFF_STATE), "4405205001400070");
    }
}
