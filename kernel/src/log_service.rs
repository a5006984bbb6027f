//! Kernel log service.
//!
//! Routes the `log` facade to the serial port so boot diagnostics do not
//! disturb the VGA console the shell owns. On the host build the records
//! are dropped; subsystems still compile their `log::` call sites.

use log::{LevelFilter, Log, Metadata, Record};

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    #[cfg(target_arch = "x86")]
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    #[cfg(not(target_arch = "x86"))]
    fn log(&self, _record: &Record) {}

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the serial logger. Safe to call once during boot, before the
/// subsystems that log come up.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}
