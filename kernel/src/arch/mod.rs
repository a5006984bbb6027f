//! Architecture support.
//!
//! Only i686 (32-bit protected mode) is implemented; the host build sees
//! an empty shell of this module so portable code can be tested.

pub mod context;

#[cfg(target_arch = "x86")]
pub mod x86;

/// Halt the CPU forever.
#[cfg(target_arch = "x86")]
pub fn halt() -> ! {
    loop {
        x86::hlt();
    }
}

#[cfg(not(target_arch = "x86"))]
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
