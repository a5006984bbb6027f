//! Kernel error types.
//!
//! Structured errors for the subsystems that propagate `Result`s; the
//! syscall boundary flattens filesystem errors back to the integer codes
//! the shell branches on (see `fs`).

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// A block read/write fell outside the device
    BlockOutOfRange { lba: u32, count: u32 },
    /// The device reported a hardware fault
    HardwareError { device: &'static str, code: u32 },
    /// A caller-supplied buffer was not a multiple of the block size
    UnalignedBuffer { len: usize },
    /// No free slot in a fixed pool
    ResourceExhausted { resource: &'static str },
    /// Generic invalid argument
    InvalidArgument { name: &'static str },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::BlockOutOfRange { lba, count } => {
                write!(f, "block range out of bounds (lba={lba}, count={count})")
            }
            KernelError::HardwareError { device, code } => {
                write!(f, "hardware error on {device} (code {code:#x})")
            }
            KernelError::UnalignedBuffer { len } => {
                write!(f, "buffer length {len} is not block-aligned")
            }
            KernelError::ResourceExhausted { resource } => {
                write!(f, "out of {resource}")
            }
            KernelError::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
        }
    }
}
