//! Encoder reader (C3).
//!
//! Decodes the 32-bit SSI frame published by an absolute rotary encoder.
//! Grounded on `PiRaTe::SsiPosEncoder` (`pirt/encoder.h` / `encoder.cpp`):
//! same bit layout, Gray decoding, plausibility gate and conn-error
//! countdown.

use crate::bus::{Bus, BusHandle, SpiInterface, SpiMode};
use crate::error::HalError;
use mount_common::consts::{ENCODER_MAX_CONN_ERRORS, ENCODER_MAX_TURNS_PER_SECOND, ENCODER_POLL_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Snapshot of encoder state, published atomically under the encoder's own
/// lock at the end of each successful read cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderReading {
    /// Single-turn position, 0..2^st_bits.
    pub position: u32,
    /// Signed turn count.
    pub turns: i32,
    /// Instantaneous angular speed, degrees/s.
    pub angular_speed_deg_s: f64,
    /// Duration of the last successful bus read.
    pub read_duration: Duration,
}

impl Default for EncoderReading {
    fn default() -> Self {
        EncoderReading {
            position: 0,
            turns: 0,
            angular_speed_deg_s: 0.0,
            read_duration: Duration::ZERO,
        }
    }
}

/// Gray-decode a value per the standard reflected-binary algorithm. Same
/// bit-twiddling as `SsiPosEncoder::gray_decode`.
pub fn gray_decode(mut g: u32) -> u32 {
    let mut bit = 1u32 << 31;
    while bit > 1 {
        if g & bit != 0 {
            g ^= bit >> 1;
        }
        bit >>= 1;
    }
    g
}

fn sgn(v: i32) -> i32 {
    (v > 0) as i32 - (v < 0) as i32
}

/// Configuration for one encoder channel.
#[derive(Debug, Clone, Copy)]
pub struct EncoderConfig {
    pub interface: SpiInterfaceChoice,
    pub channel: u8,
    pub mode: SpiModeChoice,
    pub baudrate_hz: u32,
    pub st_bits: u8,
    pub mt_bits: u8,
    pub max_turns_per_second: f64,
}

/// Re-exported choice types so config doesn't need to reach into `bus`.
pub type SpiInterfaceChoice = SpiInterface;
pub type SpiModeChoice = SpiMode;

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            interface: SpiInterface::Main,
            channel: 0,
            mode: SpiMode::Pol1Pha1,
            baudrate_hz: 500_000,
            st_bits: 12,
            mt_bits: 12,
            max_turns_per_second: ENCODER_MAX_TURNS_PER_SECOND,
        }
    }
}

struct Shared {
    reading: EncoderReading,
    bit_errors: u64,
    conn_error_countdown: u32,
    last_position: u32,
    last_turns: i32,
}

/// Background-thread-driven reader for one absolute rotary encoder channel.
pub struct Encoder {
    shared: Arc<Mutex<Shared>>,
    active: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Encoder {
    /// Connect to the shift-in bus and start the 50 ms read loop.
    pub fn connect(bus: Arc<Bus>, config: EncoderConfig) -> Result<Self, HalError> {
        let handle = bus.spi_open(config.interface, config.channel, config.mode, config.baudrate_hz);

        let shared = Arc::new(Mutex::new(Shared {
            reading: EncoderReading::default(),
            bit_errors: 0,
            conn_error_countdown: ENCODER_MAX_CONN_ERRORS,
            last_position: 0,
            last_turns: 0,
        }));
        let active = Arc::new(AtomicBool::new(true));

        let thread_shared = shared.clone();
        let thread_active = active.clone();
        let join = std::thread::spawn(move || {
            read_loop(bus, handle, config, thread_shared, thread_active);
        });

        Ok(Encoder {
            shared,
            active,
            join: Some(join),
        })
    }

    /// Latest published reading.
    pub fn reading(&self) -> EncoderReading {
        self.shared.lock().expect("encoder mutex poisoned").reading
    }

    /// Cumulative bit/framing error count.
    pub fn bit_error_count(&self) -> u64 {
        self.shared.lock().expect("encoder mutex poisoned").bit_errors
    }

    /// `true` iff the loop is running and the conn-error countdown hasn't
    /// been exhausted.
    pub fn status_ok(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self.shared.lock().expect("encoder mutex poisoned").conn_error_countdown > 0
    }

    /// Absolute position in revolutions, inverting the negative-turn
    /// offset per the original `absolutePosition()`.
    pub fn absolute_position(&self, st_bits: u8) -> f64 {
        let r = self.reading();
        let mut pos = r.position as f64 / (1u32 << st_bits) as f64;
        if r.turns < 0 {
            pos = 1.0 - pos;
        }
        pos + r.turns as f64
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn read_loop(
    bus: Arc<Bus>,
    handle: BusHandle,
    config: EncoderConfig,
    shared: Arc<Mutex<Shared>>,
    active: Arc<AtomicBool>,
) {
    let loop_delay = Duration::from_millis(ENCODER_POLL_MS);
    let mut error_flag = true;
    let mut last_read_time = Instant::now();

    while active.load(Ordering::Acquire) {
        let current_read_time = Instant::now();
        match bus.spi_read(handle, 4) {
            Err(_) => {
                error_flag = true;
                let mut s = shared.lock().expect("encoder mutex poisoned");
                if s.conn_error_countdown > 0 {
                    s.conn_error_countdown -= 1;
                }
            }
            Ok(bytes) => {
                let read_duration = current_read_time.elapsed();
                let data = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

                if data & (1 << 31) == 0 {
                    let mut s = shared.lock().expect("encoder mutex poisoned");
                    s.bit_errors += 1;
                    error_flag = true;
                    last_read_time = current_read_time;
                    std::thread::sleep(loop_delay);
                    continue;
                }

                let shift = 32 - config.st_bits - config.mt_bits - 1;
                let mut temp = data >> shift;
                temp &= (1u32 << (config.st_bits + config.mt_bits)) - 1;
                temp = gray_decode(temp);

                let st = temp & ((1u32 << config.st_bits) - 1);
                let mut mt = ((temp >> config.st_bits) & ((1u32 << config.mt_bits) - 1)) as i32;
                if data & (1 << 30) != 0 {
                    mt = -mt - 1;
                }

                if error_flag {
                    let mut s = shared.lock().expect("encoder mutex poisoned");
                    s.last_position = st;
                    s.last_turns = mt;
                    last_read_time = current_read_time;
                    error_flag = false;
                    drop(s);
                    std::thread::sleep(loop_delay);
                    continue;
                }

                let (turn_diff, pos_diff, last_pos, last_turns) = {
                    let s = shared.lock().expect("encoder mutex poisoned");
                    (
                        mt - s.last_turns,
                        st as i32 - s.last_position as i32,
                        s.last_position,
                        s.last_turns,
                    )
                };
                let _ = (last_pos, last_turns);

                if turn_diff.abs() > 1 {
                    let mut s = shared.lock().expect("encoder mutex poisoned");
                    s.bit_errors += 1;
                    error_flag = true;
                    last_read_time = current_read_time;
                    drop(s);
                    std::thread::sleep(loop_delay);
                    continue;
                }

                let mut pos_diff = pos_diff;
                if pos_diff.abs() > (1i32 << (config.st_bits - 1)) {
                    pos_diff -= sgn(pos_diff) * (1i32 << config.st_bits);
                }

                let diff_time = current_read_time.duration_since(last_read_time);
                let mut speed = pos_diff as f64 / (1u32 << config.st_bits) as f64;
                if diff_time.as_millis() > 0 {
                    speed *= 1000.0 / diff_time.as_millis() as f64;
                } else {
                    speed = 0.0;
                }

                if speed.abs() > config.max_turns_per_second {
                    let mut s = shared.lock().expect("encoder mutex poisoned");
                    s.bit_errors += 1;
                    error_flag = true;
                    last_read_time = current_read_time;
                    drop(s);
                    std::thread::sleep(loop_delay);
                    continue;
                }

                speed *= 360.0;

                let mut s = shared.lock().expect("encoder mutex poisoned");
                s.last_position = st;
                s.last_turns = mt;
                s.reading = EncoderReading {
                    position: st,
                    turns: mt,
                    angular_speed_deg_s: speed,
                    read_duration,
                };
                if s.conn_error_countdown < ENCODER_MAX_CONN_ERRORS {
                    s.conn_error_countdown += 1;
                }
                drop(s);
                last_read_time = current_read_time;
            }
        }
        std::thread::sleep(loop_delay);
    }
    warn!("encoder read loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    fn encode_frame(st: u32, mt_raw: u32, st_bits: u8, mt_bits: u8) -> u32 {
        // Build: bit31=1, bits[30..30-mt_bits+1] = gray(sign+mt), etc.
        // Inverse of gray_decode for round-trip construction in tests:
        // gray_encode(x) = x ^ (x >> 1).
        fn gray_encode(x: u32) -> u32 {
            x ^ (x >> 1)
        }
        let combined = (mt_raw << st_bits) | st;
        let gray = gray_encode(combined);
        let shift = 32 - st_bits - mt_bits - 1;
        (1u32 << 31) | (gray << shift)
    }

    #[test]
    fn gray_decode_round_trips_gray_encode() {
        for v in [0u32, 1, 2, 3, 1000, 0xFFF] {
            let encoded = v ^ (v >> 1);
            assert_eq!(gray_decode(encoded), v);
        }
    }

    #[test]
    fn plausible_frames_update_reading() {
        let bus = Arc::new(Bus::connect().unwrap());
        let config = EncoderConfig::default();

        // Two consecutive frames with a small st delta; first establishes
        // baseline (error_flag starts true), second should publish.
        let frame1 = encode_frame(100, 0, config.st_bits, config.mt_bits);
        let frame2 = encode_frame(105, 0, config.st_bits, config.mt_bits);
        bus.push_spi_frame(frame2.to_be_bytes().to_vec());
        bus.push_spi_frame(frame1.to_be_bytes().to_vec());

        let encoder = Encoder::connect(bus, config).unwrap();
        std::thread::sleep(Duration::from_millis(250));
        assert!(encoder.status_ok());
    }

    #[test]
    fn missing_sanity_bit_is_framing_error() {
        let bus = Arc::new(Bus::connect().unwrap());
        let config = EncoderConfig::default();
        // Bit 31 clear.
        bus.push_spi_frame(0u32.to_be_bytes().to_vec());

        let encoder = Encoder::connect(bus, config).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert!(encoder.bit_error_count() >= 1);
    }

    #[test]
    fn absolute_position_inverts_negative_turn_offset() {
        // Directly validate the formula without running the thread.
        let shared = Arc::new(Mutex::new(Shared {
            reading: EncoderReading {
                position: 1024,
                turns: -1,
                angular_speed_deg_s: 0.0,
                read_duration: Duration::ZERO,
            },
            bit_errors: 0,
            conn_error_countdown: ENCODER_MAX_CONN_ERRORS,
            last_position: 0,
            last_turns: 0,
        }));
        let encoder = Encoder {
            shared,
            active: Arc::new(AtomicBool::new(false)),
            join: None,
        };
        let pos = encoder.absolute_position(12);
        // position/4096 = 0.25, turns=-1 => 1 - 0.25 + (-1) = -0.25
        assert!((pos - (-0.25)).abs() < 1e-9);
    }
}
