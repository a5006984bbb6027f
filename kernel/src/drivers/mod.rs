//! Hardware drivers: the ATA block device the filesystem mounts on and
//! the PS/2 keyboard the shell reads from.

#[cfg(target_arch = "x86")]
pub mod ata;
#[cfg(target_arch = "x86")]
pub mod keyboard;
