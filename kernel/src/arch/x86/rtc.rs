//! CMOS Real-Time Clock reader.
//!
//! Reads the MC146818-compatible RTC through index port 0x70 and data port
//! 0x71, using the read-until-two-identical-passes protocol to avoid
//! tearing against an in-progress update. Decoding and the GMT offset live
//! in the portable `clock` module.

use super::{inb, outb};
use crate::clock::{self, DateTime, RawCmosTime};
use crate::config::RTC_GMT_OFFSET_HOURS;

const CMOS_ADDRESS: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;

/// Century register index reported by the ACPI FADT on common chipsets.
const CENTURY_REGISTER: u8 = 0x32;

fn read_register(reg: u8) -> u8 {
    // SAFETY: writing the register index to 0x70 then reading 0x71 is the
    // defined CMOS access protocol; the NMI-disable bit stays clear.
    unsafe {
        outb(CMOS_ADDRESS, reg);
        inb(CMOS_DATA)
    }
}

fn update_in_progress() -> bool {
    read_register(0x0A) & 0x80 != 0
}

fn read_raw() -> RawCmosTime {
    while update_in_progress() {
        core::hint::spin_loop();
    }
    RawCmosTime {
        second: read_register(0x00),
        minute: read_register(0x02),
        hour: read_register(0x04),
        day: read_register(0x07),
        month: read_register(0x08),
        year: read_register(0x09),
        century: read_register(CENTURY_REGISTER),
        register_b: read_register(0x0B),
    }
}

/// Read the local wall-clock time.
///
/// Two consecutive raw snapshots must agree before the value is accepted,
/// then the configured GMT offset is applied with full calendar rollover.
pub fn read() -> DateTime {
    let mut last = read_raw();
    loop {
        let current = read_raw();
        if current == last {
            break;
        }
        last = current;
    }
    clock::apply_hour_offset(clock::decode(last), RTC_GMT_OFFSET_HOURS)
}
