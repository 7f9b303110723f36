//! CoLa A telegram codec: framing, field decoding and the polar→Cartesian
//! transform. Stateless; all I/O lives in `base::channel`.

use crate::base::{Error, Result};
use crate::types::{Point3D, ScanTelegram};
use byteorder::{BigEndian, ByteOrder};
use log::trace;

/// Start-of-telegram frame byte.
pub const STX: u8 = 0x02;

/// End-of-telegram frame byte.
pub const ETX: u8 = 0x03;

/// Angles travel as 1/10000 degree fixed-point on the wire.
const ANGLE_FIXED_FACTOR: f64 = 10000.0;

/// DIST1 scale factor for the LMS4000 (x 0.1, advertised as 3DCCCCCDh).
const DIST1_SCALE: f64 = 0.1;

const MM_PER_METER: f64 = 1000.0;

// Scan reply token layout: 18 header tokens, the 3-token encoder block, then the body.
const HEADER_TOKEN_COUNT: usize = 18;
const ENCODER_BLOCK_LEN: usize = 3;
const ENCODER_TICKS_OFFSET: usize = 1;
const BODY_OFFSET: usize = HEADER_TOKEN_COUNT + ENCODER_BLOCK_LEN;
const BODY_START_ANGLE: usize = 4;
const BODY_ANGLE_STEP: usize = 5;
const BODY_VALUE_COUNT: usize = 6;
const BODY_FIRST_SAMPLE: usize = 7;

/// Wraps a command in STX/ETX and encodes it to wire bytes.
pub fn frame(command: &str) -> Vec<u8> {
    let mut framed = Vec::with_capacity(command.len() + 2);
    framed.push(STX);
    framed.extend_from_slice(command.as_bytes());
    framed.push(ETX);
    framed
}

/// Strips every STX/ETX octet from a raw read.
///
/// Idempotent: input that carries no frame bytes is returned unchanged.
pub fn unframe(raw: &str) -> String {
    raw.chars()
        .filter(|&c| c != STX as char && c != ETX as char)
        .collect()
}

/// Encodes an angle as the sensor's fixed-point hex form (x 10000, truncated
/// toward zero, 32-bit two's complement for negative values). Inverse of the
/// signed start-angle decode.
pub fn angle_to_hex_fixed(angle_deg: f64) -> String {
    let fixed = (angle_deg * ANGLE_FIXED_FACTOR).trunc() as i32;
    format!("{:X}", fixed as u32)
}

pub(crate) fn parse_hex_u32(token: &str, field: &str) -> Result<u32> {
    u32::from_str_radix(token, 16).map_err(|_| Error::MalformedTelegram {
        description: format!("{} field is not parseable hex: {:?}", field, token),
    })
}

fn hex_octets(token: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = u8::from_str_radix(token.get(2 * i..2 * i + 2)?, 16).ok()?;
    }
    Some(octets)
}

/// The start-angle field occurs in two encodings in captured data: a full
/// 8-digit big-endian two's-complement form and a shorter plain hex form. The
/// signed form is decoded first; plain hex is the fallback.
fn parse_start_angle(token: &str) -> Result<f64> {
    if token.len() == 8 {
        if let Some(octets) = hex_octets(token) {
            return Ok(BigEndian::read_i32(&octets) as f64 / ANGLE_FIXED_FACTOR);
        }
    }
    let raw = parse_hex_u32(token, "start angle")?;
    Ok(raw as f64 / ANGLE_FIXED_FACTOR)
}

/// Decodes the whitespace-split tokens of one `LMDscandata` reply.
///
/// Token contract: `tokens[0..18]` header (ignored), `tokens[18..21]` encoder
/// block with the tick counter at block index 1, `tokens[21..]` body. Body
/// index 4 is the start angle, 5 the angle step, 6 the sample count N, and
/// 7..7+N the distance samples.
pub fn decode_scan(tokens: &[&str]) -> Result<ScanTelegram> {
    if tokens.len() < BODY_OFFSET + BODY_FIRST_SAMPLE {
        return Err(Error::MalformedTelegram {
            description: format!("scan telegram truncated: {} tokens", tokens.len()),
        });
    }

    let encoder = &tokens[HEADER_TOKEN_COUNT..BODY_OFFSET];
    let encoder_ticks = parse_hex_u32(encoder[ENCODER_TICKS_OFFSET], "encoder tick")?;

    let body = &tokens[BODY_OFFSET..];
    let start_angle_deg = parse_start_angle(body[BODY_START_ANGLE])?;
    let angle_step_deg =
        parse_hex_u32(body[BODY_ANGLE_STEP], "angle step")? as f64 / ANGLE_FIXED_FACTOR;
    let value_count = parse_hex_u32(body[BODY_VALUE_COUNT], "value count")? as usize;

    if body.len() < BODY_FIRST_SAMPLE + value_count {
        return Err(Error::MalformedTelegram {
            description: format!(
                "scan telegram carries {} of {} distance samples",
                body.len() - BODY_FIRST_SAMPLE,
                value_count
            ),
        });
    }

    let mut distances = Vec::with_capacity(value_count);
    for token in &body[BODY_FIRST_SAMPLE..BODY_FIRST_SAMPLE + value_count] {
        let raw = parse_hex_u32(token, "distance sample")?;
        distances.push(raw as f64 * DIST1_SCALE / MM_PER_METER);
    }

    trace!(
        "Decoded scan: start={:.4} deg, step={:.4} deg, {} samples, encoder={}",
        start_angle_deg,
        angle_step_deg,
        distances.len(),
        encoder_ticks
    );

    Ok(ScanTelegram {
        start_angle_deg,
        angle_step_deg,
        distances,
        encoder_ticks,
    })
}

/// Generates the per-sample angles `start + i * step` for `i` in `[0, count)`.
pub fn sample_angles(start_deg: f64, step_deg: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start_deg + step_deg * i as f64).collect()
}

/// Projects polar samples onto the scan plane: `x = r cos θ`, `y = r sin θ`.
pub fn to_cartesian(distances: &[f64], angles_deg: &[f64]) -> Vec<(f64, f64)> {
    distances
        .iter()
        .zip(angles_deg.iter())
        .map(|(&r, &t)| (r * t.to_radians().cos(), r * t.to_radians().sin()))
        .collect()
}

/// Expands one decoded telegram into 3-D points.
///
/// x/y come from the polar samples; z is the encoder position, ticks times the
/// encoder resolution in millimeters, converted to meters.
pub fn points_from_telegram(telegram: &ScanTelegram, encoder_resolution_mm: f64) -> Vec<Point3D> {
    let angles = sample_angles(
        telegram.start_angle_deg,
        telegram.angle_step_deg,
        telegram.distances.len(),
    );
    let z = telegram.encoder_ticks as f64 * encoder_resolution_mm / MM_PER_METER;
    to_cartesian(&telegram.distances, &angles)
        .into_iter()
        .map(|(x, y)| Point3D { x, y, z })
        .collect()
}
