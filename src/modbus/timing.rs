//! Silence intervals for a half-duplex RTU transaction.
//!
//! Above 19200 baud the fixed 750 µs character / 1750 µs frame values apply,
//! as do they when the baud rate is unknown (0).

use std::time::Duration;

pub const FAST_BAUD_THRESHOLD: u32 = 19_200;
pub const DEFAULT_GUARD_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_DELAY_MULTIPLIER: u32 = 2;

const FIXED_CHARACTER_NANOS: u64 = 750_000;
const FIXED_FRAME_NANOS: u64 = 1_750_000;
// 1.5 and 3.5 character times of 10 bits each, in nanoseconds * baud
const CHARACTER_NANOS_BAUD: u64 = 15_000_000_000;
const FRAME_NANOS_BAUD: u64 = 35_000_000_000;

/// Character and frame silence for `baud_rate`.
pub fn character_and_frame_time(baud_rate: u32) -> (Duration, Duration) {
    if baud_rate == 0 || baud_rate > FAST_BAUD_THRESHOLD {
        return (
            Duration::from_nanos(FIXED_CHARACTER_NANOS),
            Duration::from_nanos(FIXED_FRAME_NANOS),
        );
    }
    let baud = baud_rate as u64;
    (
        Duration::from_nanos(CHARACTER_NANOS_BAUD / baud),
        Duration::from_nanos(FRAME_NANOS_BAUD / baud),
    )
}

/// Wait between finishing the write and attempting the read, for
/// `total_bytes` = request length + predicted response length.
pub fn inter_frame_delay(baud_rate: u32, total_bytes: usize, multiplier: u32) -> Duration {
    let (character, frame) = character_and_frame_time(baud_rate);
    (character * total_bytes as u32 + frame) * multiplier
}
