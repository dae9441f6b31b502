//! Wire format of the controller link.
//!
//! Every frame is `0xA5, command, length, payload[length], checksum`, where the
//! checksum is the low byte of the sum of all preceding bytes. Responses echo
//! the request command with the high bit set.

use byteorder::{ByteOrder, LittleEndian};
use imu_traits::Vector3;
use std::fmt;

pub const SYNC: u8 = 0xA5;
pub const HEADER_LEN: usize = 3;
pub const MAX_PAYLOAD: usize = 64;
pub const MAX_FRAME: usize = HEADER_LEN + MAX_PAYLOAD + 1;
pub const RESPONSE_BIT: u8 = 0x80;
pub const IMU_PAYLOAD_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping = 0x01,
    ReadImu = 0x02,
    SetPower = 0x03,
}

impl Command {
    pub fn response_code(self) -> u8 {
        self as u8 | RESPONSE_BIT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    BadSync(u8),
    UnexpectedCommand { expected: u8, found: u8 },
    BadLength { expected: usize, found: usize },
    Checksum { expected: u8, found: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadSync(b) => write!(f, "expected sync byte 0xA5, got {:#04x}", b),
            FrameError::UnexpectedCommand { expected, found } => {
                write!(f, "expected response {:#04x}, got {:#04x}", expected, found)
            }
            FrameError::BadLength { expected, found } => {
                write!(f, "expected payload of {} bytes, got {}", expected, found)
            }
            FrameError::Checksum { expected, found } => {
                write!(f, "checksum mismatch: computed {:#04x}, frame has {:#04x}", expected, found)
            }
        }
    }
}

impl std::error::Error for FrameError {}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Writes a request frame into `out` and returns the number of bytes used.
///
/// Panics if the payload is longer than [`MAX_PAYLOAD`].
pub fn encode(command: Command, payload: &[u8], out: &mut [u8; MAX_FRAME]) -> usize {
    assert!(payload.len() <= MAX_PAYLOAD, "payload too large");
    out[0] = SYNC;
    out[1] = command as u8;
    out[2] = payload.len() as u8;
    out[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    let end = HEADER_LEN + payload.len();
    out[end] = checksum(&out[..end]);
    end + 1
}

/// Validates a response header and returns the announced payload length.
pub fn check_header(header: &[u8; HEADER_LEN], command: Command) -> Result<usize, FrameError> {
    if header[0] != SYNC {
        return Err(FrameError::BadSync(header[0]));
    }
    if header[1] != command.response_code() {
        return Err(FrameError::UnexpectedCommand {
            expected: command.response_code(),
            found: header[1],
        });
    }
    let len = header[2] as usize;
    if len > MAX_PAYLOAD {
        return Err(FrameError::BadLength {
            expected: MAX_PAYLOAD,
            found: len,
        });
    }
    Ok(len)
}

/// Verifies the trailing checksum over header + payload.
pub fn check_body(header: &[u8; HEADER_LEN], body: &[u8]) -> Result<(), FrameError> {
    let (payload, trailer) = body.split_at(body.len() - 1);
    let expected = checksum(header).wrapping_add(checksum(payload));
    if trailer[0] != expected {
        return Err(FrameError::Checksum {
            expected,
            found: trailer[0],
        });
    }
    Ok(())
}

/// IMU payload: accel, gyro and mag as nine little-endian f32.
pub fn decode_imu(payload: &[u8]) -> Result<[Vector3; 3], FrameError> {
    if payload.len() != IMU_PAYLOAD_LEN {
        return Err(FrameError::BadLength {
            expected: IMU_PAYLOAD_LEN,
            found: payload.len(),
        });
    }
    let v = |i: usize| {
        let o = i * 12;
        Vector3 {
            x: LittleEndian::read_f32(&payload[o..o + 4]),
            y: LittleEndian::read_f32(&payload[o + 4..o + 8]),
            z: LittleEndian::read_f32(&payload[o + 8..o + 12]),
        }
    };
    Ok([v(0), v(1), v(2)])
}

pub fn encode_imu(readings: &[Vector3; 3]) -> [u8; IMU_PAYLOAD_LEN] {
    let mut out = [0u8; IMU_PAYLOAD_LEN];
    for (i, v) in readings.iter().enumerate() {
        let o = i * 12;
        LittleEndian::write_f32(&mut out[o..o + 4], v.x);
        LittleEndian::write_f32(&mut out[o + 4..o + 8], v.y);
        LittleEndian::write_f32(&mut out[o + 8..o + 12], v.z);
    }
    out
}
