//! Ferrite Kernel Library
//!
//! Core of a 32-bit protected-mode kernel: descriptor tables and interrupt
//! plumbing, 4 MiB PSE paging, a FAT32-style on-disk filesystem, a
//! round-robin process scheduler, and the `int 0x30` syscall gate the
//! user-space shell talks to.
//!
//! The crate is `no_std`. Hardware-facing modules are gated on
//! `target_arch = "x86"` / `target_os = "none"`; everything else (the
//! filesystem driver, the search algorithms, the frame bitmap, the process
//! table bookkeeping) is architecture-free and unit-tested on the host.

#![no_std]

// Host target: link std so unit tests can allocate and print normally.
#[cfg(not(target_os = "none"))]
extern crate std;

#[macro_use]
pub mod print;

pub mod config;
pub mod error;
pub mod util;

pub mod arch;
pub mod clock;
pub mod drivers;
pub mod fs;
pub mod log_service;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;

#[cfg(target_arch = "x86")]
pub mod interrupt;
#[cfg(target_arch = "x86")]
pub mod serial;
