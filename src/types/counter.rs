//! Rolling counter arithmetic
//!
//! Sensors report event counts, accumulated torque and measurement times as
//! free-running 8 or 16-bit counters. Deltas between two samples are always
//! taken modulo the counter width.

/// Events since `prev` on an 8-bit rolling counter.
pub fn delta_u8(current: u8, prev: u8) -> u8 {
    current.wrapping_sub(prev)
}

/// Ticks since `prev` on a 16-bit rolling counter.
pub fn delta_u16(current: u16, prev: u16) -> u16 {
    current.wrapping_sub(prev)
}
