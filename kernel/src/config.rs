//! Kernel-wide tunables.
//!
//! Every fixed table in the kernel is sized from here; there is no runtime
//! configuration and no kernel heap.

/// Base virtual address of the kernel's higher-half mapping.
pub const KERNEL_VIRTUAL_BASE: u32 = 0xC000_0000;

/// Page-directory index covering the higher-half base (0xC0000000 >> 22).
pub const KERNEL_HIGHER_HALF_INDEX: usize = 0x300;

/// Size of one PSE page frame (4 MiB).
pub const PAGE_FRAME_SIZE: u32 = 0x40_0000;

/// Number of 4 MiB physical frames managed by the frame allocator
/// (32 frames = 128 MiB of physical memory).
pub const PAGE_FRAME_MAX_COUNT: usize = 32;

/// Fixed pool of page directories, one per live address space.
pub const PAGE_DIRECTORY_MAX_COUNT: usize = 16;

/// Maximum number of concurrently live processes.
pub const PROCESS_COUNT_MAX: usize = 16;

/// Per-process cap on mapped 4 MiB frames (executable + stack).
pub const PROCESS_PAGE_FRAME_COUNT_MAX: usize = 8;

/// Process name length, matching the 8-byte filesystem name field.
pub const PROCESS_NAME_LEN: usize = 8;

/// PIT input clock in Hz.
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// Scheduler tick rate in Hz.
pub const PIT_TIMER_FREQUENCY: u32 = 1_000;

/// Hours added to the RTC reading (the machine's CMOS runs at GMT).
pub const RTC_GMT_OFFSET_HOURS: u8 = 7;

/// Depth limit for the recursive text-search walk.
pub const SEARCH_DEPTH_LIMIT: usize = 10;

/// Largest text file the search walk will read and match against.
pub const SEARCH_FILE_BUF_SIZE: usize = 8192;
