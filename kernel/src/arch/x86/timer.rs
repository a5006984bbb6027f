//! PIT (8253) timer.
//!
//! Channel 0, square-wave mode, programmed to the scheduler tick rate.

use core::sync::atomic::{AtomicU64, Ordering};

use super::{outb, pic};
use crate::config::{PIT_BASE_FREQUENCY, PIT_TIMER_FREQUENCY};

const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_CHANNEL_0_DATA_PORT: u16 = 0x40;

// binary counting | square wave generator | lobyte/hibyte access | channel 0
const PIT_COMMAND_VALUE: u8 = 0b00 << 6 | 0b11 << 4 | 0b011 << 1;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Ticks since the timer was activated (1 tick = 1 ms at 1 kHz).
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Bump the tick counter; called from the IRQ0 path.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Program channel 0 for periodic interrupts at `PIT_TIMER_FREQUENCY` and
/// unmask IRQ0. Must run with interrupts disabled; the divisor write pair
/// is not atomic.
pub fn activate() {
    let divisor = PIT_BASE_FREQUENCY / PIT_TIMER_FREQUENCY;
    // SAFETY: command/data writes follow the 8253 programming protocol:
    // mode word first, then the 16-bit reload value low byte before high.
    unsafe {
        outb(PIT_COMMAND_PORT, PIT_COMMAND_VALUE);
        outb(PIT_CHANNEL_0_DATA_PORT, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL_0_DATA_PORT, ((divisor >> 8) & 0xFF) as u8);
    }

    pic::unmask(pic::IRQ_TIMER);
}
