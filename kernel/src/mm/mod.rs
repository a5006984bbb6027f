//! Memory management: the 4 MiB page-frame bitmap and the PSE page
//! directory pool.

mod frame_allocator;
pub mod paging;

pub use frame_allocator::{FrameAllocator, FrameNumber, FRAME_ALLOCATOR};
pub use paging::PdHandle;
