use hmd_traits::HmdError;
use tracing::{debug, warn};

pub const HEADER: u8 = 0x55;
pub const FRAME_LEN: usize = 11;
pub const DEFAULT_CAPACITY: usize = 1024;

const ACCELERATION: u8 = 0x51;
const GYRO: u8 = 0x52;
const ANGLE: u8 = 0x53;
const MAGNETOMETER: u8 = 0x54;
const QUATERNION: u8 = 0x59;

/// Full-scale ranges of the sensor outputs.
const K_ACC: f32 = 16.0; // g
const K_GYRO: f32 = 2000.0; // deg/s
const K_ANGLE: f32 = 180.0; // deg

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadFrame {
    /// Acceleration (g), temperature (°C)
    Acceleration { x: f32, y: f32, z: f32, temp: f32 },
    /// Angular velocity (deg/s), supply voltage (V)
    Gyro { x: f32, y: f32, z: f32, voltage: f32 },
    /// Onboard fused angles (deg)
    Angle { roll: f32, pitch: f32, yaw: f32, version: u16 },
    /// Raw magnetometer counts, temperature (°C)
    Magnetometer { x: f32, y: f32, z: f32, temp: f32 },
    Quaternion { w: f32, x: f32, y: f32, z: f32 },
}

impl ReadFrame {
    /// Decodes one complete packet, header and checksum included.
    pub fn decode(packet: &[u8]) -> Result<Self, HmdError> {
        if packet.len() != FRAME_LEN {
            return Err(HmdError::InvalidPacket(format!(
                "expected {} bytes, got {}",
                FRAME_LEN,
                packet.len()
            )));
        }
        if packet[0] != HEADER {
            return Err(HmdError::InvalidPacket(format!("bad header 0x{:02x}", packet[0])));
        }
        let expected = checksum(&packet[..FRAME_LEN - 1]);
        if expected != packet[FRAME_LEN - 1] {
            return Err(HmdError::InvalidPacket(format!(
                "checksum 0x{:02x}, expected 0x{:02x}",
                packet[FRAME_LEN - 1],
                expected
            )));
        }

        let data = &packet[2..FRAME_LEN - 1];
        let word = |i: usize| i16::from_le_bytes([data[2 * i], data[2 * i + 1]]);
        let scaled = |i: usize, k: f32| word(i) as f32 / 32768.0 * k;

        match packet[1] {
            ACCELERATION => Ok(ReadFrame::Acceleration {
                x: scaled(0, K_ACC),
                y: scaled(1, K_ACC),
                z: scaled(2, K_ACC),
                temp: word(3) as f32 / 100.0,
            }),
            GYRO => Ok(ReadFrame::Gyro {
                x: scaled(0, K_GYRO),
                y: scaled(1, K_GYRO),
                z: scaled(2, K_GYRO),
                voltage: word(3) as f32 / 100.0,
            }),
            ANGLE => Ok(ReadFrame::Angle {
                roll: scaled(0, K_ANGLE),
                pitch: scaled(1, K_ANGLE),
                yaw: scaled(2, K_ANGLE),
                version: word(3) as u16,
            }),
            MAGNETOMETER => Ok(ReadFrame::Magnetometer {
                x: word(0) as f32,
                y: word(1) as f32,
                z: word(2) as f32,
                temp: word(3) as f32 / 100.0,
            }),
            QUATERNION => Ok(ReadFrame::Quaternion {
                w: scaled(0, 1.0),
                x: scaled(1, 1.0),
                y: scaled(2, 1.0),
                z: scaled(3, 1.0),
            }),
            kind => Err(HmdError::InvalidPacket(format!("unknown packet type 0x{:02x}", kind))),
        }
    }
}

/// Low byte of the sum of every byte in `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Incremental decoder for the 11-byte `0x55`-framed packet stream.
pub struct FrameParser {
    buffer: Vec<u8>,
    capacity: usize,
}

impl FrameParser {
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY).max(FRAME_LEN);
        FrameParser { buffer: Vec::with_capacity(capacity), capacity }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds raw bytes and returns every complete packet decoded so far.
    /// Trailing partial packets are kept for the next call.
    pub fn parse(&mut self, data: &[u8]) -> Vec<ReadFrame> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.capacity {
            let excess = self.buffer.len() - self.capacity;
            warn!("Frame buffer full, dropping {} stale bytes", excess);
            self.buffer.drain(..excess);
        }

        let mut frames = Vec::new();
        let mut start = 0;
        while self.buffer.len() - start >= FRAME_LEN {
            let packet = &self.buffer[start..start + FRAME_LEN];
            if packet[0] != HEADER {
                start += 1;
                continue;
            }
            if checksum(&packet[..FRAME_LEN - 1]) != packet[FRAME_LEN - 1] {
                debug!("Checksum mismatch, resyncing");
                start += 1;
                continue;
            }
            match ReadFrame::decode(packet) {
                Ok(frame) => frames.push(frame),
                Err(e) => debug!("Skipping packet: {}", e),
            }
            start += FRAME_LEN;
        }
        self.buffer.drain(..start);

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn packet(kind: u8, words: [i16; 4]) -> Vec<u8> {
        let mut bytes = vec![HEADER, kind];
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes.push(checksum(&bytes));
        bytes
    }

    fn quaternion_w(frame: &ReadFrame) -> f32 {
        match *frame {
            ReadFrame::Quaternion { w, .. } => w,
            other => panic!("expected a quaternion, got {:?}", other),
        }
    }

    #[test]
    fn test_decodes_quaternion_and_gyro() {
        let mut parser = FrameParser::new(None);
        let mut stream = packet(QUATERNION, [16384, 0, -16384, 0]);
        stream.extend(packet(GYRO, [16384, -8192, 0, 1200]));

        let frames = parser.parse(&stream);
        assert_eq!(frames.len(), 2);

        assert_eq!(frames[0], ReadFrame::Quaternion { w: 0.5, x: 0.0, y: -0.5, z: 0.0 });

        match frames[1] {
            ReadFrame::Gyro { x, y, z, voltage } => {
                assert_relative_eq!(x, 1000.0);
                assert_relative_eq!(y, -500.0);
                assert_relative_eq!(z, 0.0);
                assert_relative_eq!(voltage, 12.0);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_decodes_acceleration_and_angle() {
        let mut parser = FrameParser::new(None);
        let mut stream = packet(ACCELERATION, [2048, 0, -2048, 2512]);
        stream.extend(packet(ANGLE, [0, 8192, -16384, 0x1234]));

        let frames = parser.parse(&stream);
        assert_eq!(
            frames[0],
            ReadFrame::Acceleration { x: 1.0, y: 0.0, z: -1.0, temp: 25.12 }
        );
        assert_eq!(
            frames[1],
            ReadFrame::Angle { roll: 0.0, pitch: 45.0, yaw: -90.0, version: 0x1234 }
        );
    }

    #[test]
    fn test_resyncs_after_garbage_and_bad_checksum() {
        let mut parser = FrameParser::new(None);
        let mut corrupt = packet(QUATERNION, [1, 2, 3, 4]);
        corrupt[10] = corrupt[10].wrapping_add(1);

        let mut stream = vec![0x00, 0x55, 0xAB];
        stream.extend(corrupt);
        stream.extend(packet(QUATERNION, [32767, 0, 0, 0]));

        let frames = parser.parse(&stream);
        assert_eq!(frames.len(), 1);
        assert_relative_eq!(quaternion_w(&frames[0]), 32767.0 / 32768.0);
    }

    #[test]
    fn test_keeps_split_packets_across_calls() {
        let mut parser = FrameParser::new(None);
        let bytes = packet(GYRO, [0, 0, 16384, 0]);

        assert!(parser.parse(&bytes[..4]).is_empty());
        assert_eq!(parser.pending(), 4);

        let frames = parser.parse(&bytes[4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], ReadFrame::Gyro { x: 0.0, y: 0.0, z: 1000.0, voltage: 0.0 });
    }

    #[test]
    fn test_skips_unknown_packet_types() {
        let mut parser = FrameParser::new(None);
        let mut stream = packet(0x5A, [1, 2, 3, 4]);
        stream.extend(packet(QUATERNION, [32767, 0, 0, 0]));

        let frames = parser.parse(&stream);
        assert_eq!(frames.len(), 1);
        assert_relative_eq!(quaternion_w(&frames[0]), 32767.0 / 32768.0);
    }

    #[test]
    fn test_decode_rejects_malformed_packets() {
        let good = packet(GYRO, [1, 2, 3, 4]);
        assert!(ReadFrame::decode(&good).is_ok());

        let mut bad_sum = good.clone();
        bad_sum[10] ^= 0xFF;
        let mut bad_header = good.clone();
        bad_header[0] = 0x56;

        for bytes in [&good[..10], &bad_sum[..], &bad_header[..], &packet(0x5A, [0; 4])[..]] {
            assert!(matches!(ReadFrame::decode(bytes), Err(HmdError::InvalidPacket(_))));
        }
    }

    #[test]
    fn test_buffer_is_capped() {
        let mut parser = FrameParser::new(Some(16));
        parser.parse(&[0u8; 64]);
        assert!(parser.pending() <= 16);
    }
}
