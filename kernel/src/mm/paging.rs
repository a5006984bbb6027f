//! PSE paging: one-level translation through 4 MiB page directory entries.
//!
//! Bits 31..22 of a virtual address select the directory entry; a present
//! 4 MiB entry contributes bits 31..22 of the physical address. Every
//! address space copies the kernel template's identity entry (index 0) and
//! higher-half entry (index 0x300) so traps always land in mapped kernel
//! code.

use bitflags::bitflags;
use spin::Mutex;

use super::{FrameNumber, FRAME_ALLOCATOR};
use crate::config::{
    KERNEL_HIGHER_HALF_INDEX, KERNEL_VIRTUAL_BASE, PAGE_DIRECTORY_MAX_COUNT,
};
use crate::error::KernelError;

pub const PAGE_ENTRY_COUNT: usize = 1024;

bitflags! {
    /// Flag bits of a page directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PdeFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const PAGE_SIZE_4MB = 1 << 7;
    }
}

/// One page directory entry: flags in the low byte, the 4 MiB frame number
/// in bits 31..22.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageDirectoryEntry(u32);

impl PageDirectoryEntry {
    pub const EMPTY: Self = Self(0);

    pub const fn new(frame: FrameNumber, flags: PdeFlags) -> Self {
        Self((frame.as_u32() << 22) | flags.bits())
    }

    pub const fn is_present(&self) -> bool {
        self.0 & PdeFlags::PRESENT.bits() != 0
    }

    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.0 >> 22)
    }

    pub fn flags(&self) -> PdeFlags {
        PdeFlags::from_bits_truncate(self.0)
    }
}

/// A 4 KiB-aligned page directory, loadable into cr3.
#[derive(Clone, Copy)]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; PAGE_ENTRY_COUNT],
}

impl PageDirectory {
    const fn empty() -> Self {
        Self {
            entries: [PageDirectoryEntry::EMPTY; PAGE_ENTRY_COUNT],
        }
    }

    pub fn entry(&self, index: usize) -> PageDirectoryEntry {
        self.entries[index]
    }
}

/// Directory index covering `vaddr`.
pub const fn directory_index(vaddr: u32) -> usize {
    ((vaddr >> 22) & 0x3FF) as usize
}

const KERNEL_PDE: PageDirectoryEntry = PageDirectoryEntry::new(
    FrameNumber::new(0),
    PdeFlags::PRESENT.union(PdeFlags::WRITABLE).union(PdeFlags::PAGE_SIZE_4MB),
);

/// The kernel's own address space: identity map of the low 4 MiB plus the
/// higher-half alias at 0xC0000000.
static KERNEL_PAGE_DIRECTORY: Mutex<PageDirectory> = Mutex::new({
    let mut dir = PageDirectory::empty();
    dir.entries[0] = KERNEL_PDE;
    dir.entries[KERNEL_HIGHER_HALF_INDEX] = KERNEL_PDE;
    dir
});

/// Handle into the fixed page-directory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdHandle(usize);

struct DirectoryPool {
    dirs: [PageDirectory; PAGE_DIRECTORY_MAX_COUNT],
    used: [bool; PAGE_DIRECTORY_MAX_COUNT],
}

static POOL: Mutex<DirectoryPool> = Mutex::new(DirectoryPool {
    dirs: [PageDirectory::empty(); PAGE_DIRECTORY_MAX_COUNT],
    used: [false; PAGE_DIRECTORY_MAX_COUNT],
});

/// Draw an unused directory from the pool, seeded with the kernel entries
/// so kernel code stays reachable after a cr3 switch.
pub fn create_page_directory() -> Result<PdHandle, KernelError> {
    let mut pool = POOL.lock();
    let index = pool
        .used
        .iter()
        .position(|used| !used)
        .ok_or(KernelError::ResourceExhausted { resource: "page directories" })?;
    pool.used[index] = true;
    pool.dirs[index] = PageDirectory::empty();
    pool.dirs[index].entries[0] = KERNEL_PDE;
    pool.dirs[index].entries[KERNEL_HIGHER_HALF_INDEX] = KERNEL_PDE;
    Ok(PdHandle(index))
}

/// Return a directory to the pool, clearing every entry.
pub fn free_page_directory(handle: PdHandle) {
    let mut pool = POOL.lock();
    if pool.used[handle.0] {
        pool.dirs[handle.0] = PageDirectory::empty();
        pool.used[handle.0] = false;
    }
}

/// Number of directories currently checked out.
pub fn used_directory_count() -> usize {
    POOL.lock().used.iter().filter(|used| **used).count()
}

/// Map a free physical frame at `vaddr` as present + writable + user +
/// 4 MiB. Fails when the frame bitmap is exhausted.
pub fn allocate_user_frame(handle: PdHandle, vaddr: u32) -> Result<FrameNumber, KernelError> {
    let frame = FRAME_ALLOCATOR
        .lock()
        .allocate()
        .ok_or(KernelError::ResourceExhausted { resource: "page frames" })?;

    let mut pool = POOL.lock();
    let index = directory_index(vaddr);
    pool.dirs[handle.0].entries[index] = PageDirectoryEntry::new(
        frame,
        PdeFlags::PRESENT | PdeFlags::WRITABLE | PdeFlags::USER | PdeFlags::PAGE_SIZE_4MB,
    );
    drop(pool);

    flush_tlb_entry(vaddr);
    Ok(frame)
}

/// Unmap the frame at `vaddr` and release the exact physical frame the
/// entry referenced.
pub fn free_user_frame(handle: PdHandle, vaddr: u32) {
    let mut pool = POOL.lock();
    let index = directory_index(vaddr);
    let entry = pool.dirs[handle.0].entries[index];
    if !entry.is_present() {
        return;
    }
    pool.dirs[handle.0].entries[index] = PageDirectoryEntry::EMPTY;
    drop(pool);

    FRAME_ALLOCATOR.lock().free(entry.frame());
    flush_tlb_entry(vaddr);
}

/// Read one entry of a pooled directory.
pub fn directory_entry(handle: PdHandle, index: usize) -> PageDirectoryEntry {
    POOL.lock().dirs[handle.0].entry(index)
}

fn physical_addr_of(ptr: u32) -> u32 {
    if ptr >= KERNEL_VIRTUAL_BASE {
        ptr - KERNEL_VIRTUAL_BASE
    } else {
        ptr
    }
}

#[cfg(target_arch = "x86")]
fn flush_tlb_entry(vaddr: u32) {
    // SAFETY: invlpg only drops the TLB entry covering vaddr.
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) vaddr, options(nostack, preserves_flags));
    }
}

#[cfg(not(target_arch = "x86"))]
fn flush_tlb_entry(_vaddr: u32) {}

/// Switch cr3 to a pooled directory.
#[cfg(target_arch = "x86")]
pub fn use_page_directory(handle: PdHandle) {
    let pool = POOL.lock();
    let virt = &pool.dirs[handle.0] as *const PageDirectory as u32;
    drop(pool);
    load_cr3(physical_addr_of(virt));
}

/// Switch cr3 back to the kernel's own directory.
#[cfg(target_arch = "x86")]
pub fn use_kernel_directory() {
    let dir = KERNEL_PAGE_DIRECTORY.lock();
    let virt = &*dir as *const PageDirectory as u32;
    drop(dir);
    load_cr3(physical_addr_of(virt));
}

#[cfg(target_arch = "x86")]
fn load_cr3(physical_addr: u32) {
    // SAFETY: the address points at a 4 KiB-aligned directory whose kernel
    // entries are populated, so the executing code remains mapped across
    // the switch.
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) physical_addr, options(nostack, preserves_flags));
    }
}

/// Serializes tests that touch the global pool/bitmap statics.
#[cfg(test)]
pub(crate) static POOL_TEST_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_FRAME_MAX_COUNT;

    use super::POOL_TEST_LOCK as TEST_LOCK;

    #[test]
    fn entry_encoding_roundtrip() {
        let flags =
            PdeFlags::PRESENT | PdeFlags::WRITABLE | PdeFlags::USER | PdeFlags::PAGE_SIZE_4MB;
        let entry = PageDirectoryEntry::new(FrameNumber::new(3), flags);
        assert!(entry.is_present());
        assert_eq!(entry.frame().as_u32(), 3);
        assert_eq!(entry.flags(), flags);
        assert_eq!(entry.0, (3 << 22) | 0x87);
    }

    #[test]
    fn directory_index_math() {
        assert_eq!(directory_index(0), 0);
        assert_eq!(directory_index(0x3F_FFFF), 0);
        assert_eq!(directory_index(0x40_0000), 1);
        assert_eq!(directory_index(KERNEL_VIRTUAL_BASE), KERNEL_HIGHER_HALF_INDEX);
    }

    #[test]
    fn created_directories_carry_kernel_entries() {
        let _guard = TEST_LOCK.lock();
        let handle = create_page_directory().unwrap();
        assert!(directory_entry(handle, 0).is_present());
        assert!(directory_entry(handle, KERNEL_HIGHER_HALF_INDEX).is_present());
        assert!(!directory_entry(handle, 1).is_present());
        free_page_directory(handle);
    }

    #[test]
    fn pool_create_free_roundtrip() {
        let _guard = TEST_LOCK.lock();
        let before = used_directory_count();
        let handle = create_page_directory().unwrap();
        assert_eq!(used_directory_count(), before + 1);
        free_page_directory(handle);
        assert_eq!(used_directory_count(), before);
    }

    #[test]
    fn map_and_unmap_returns_frame_to_bitmap() {
        let _guard = TEST_LOCK.lock();
        let handle = create_page_directory().unwrap();
        let free_before = FRAME_ALLOCATOR.lock().free_count();

        let frame = allocate_user_frame(handle, 0).unwrap();
        assert!(frame.as_u32() > 0 && (frame.as_u32() as usize) < PAGE_FRAME_MAX_COUNT);
        let entry = directory_entry(handle, 0);
        assert!(entry.is_present());
        assert_eq!(entry.frame(), frame);
        assert_eq!(FRAME_ALLOCATOR.lock().free_count(), free_before - 1);

        free_user_frame(handle, 0);
        assert!(!directory_entry(handle, 0).is_present());
        assert_eq!(FRAME_ALLOCATOR.lock().free_count(), free_before);

        free_page_directory(handle);
    }

    #[test]
    fn physical_addr_strips_higher_half() {
        assert_eq!(physical_addr_of(KERNEL_VIRTUAL_BASE + 0x1000), 0x1000);
        assert_eq!(physical_addr_of(0x1000), 0x1000);
    }
}
