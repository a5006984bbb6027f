//! Process control: the PCB table, creation and destruction, and the
//! `ps` listing.
//!
//! A PCB slot is free when its pid is 0. Creation validates everything
//! before it allocates, so a rejected request consumes no page directory
//! and no frames; loading the executable is the last step and unwinds the
//! address space on failure.

use core::fmt::Write;

use spin::Mutex;

use crate::arch::context::Context;
use crate::config::{
    KERNEL_VIRTUAL_BASE, PAGE_FRAME_SIZE, PROCESS_COUNT_MAX, PROCESS_NAME_LEN,
    PROCESS_PAGE_FRAME_COUNT_MAX,
};
use crate::mm::{paging, PdHandle};
use crate::util::{ceil_div, SliceWriter};

/// Process lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New = 0,
    Ready = 1,
    Running = 2,
    Waiting = 3,
    Terminated = 4,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::New => "NEW",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Waiting => "WAITING",
            ProcessState::Terminated => "TERMINATED",
        }
    }
}

/// Why process creation failed, in syscall-code order.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    MaxProcessExceeded = 1,
    InvalidEntrypoint = 2,
    NotEnoughMemory = 3,
    FsReadFailure = 4,
}

/// One process control block.
#[derive(Debug, Clone, Copy)]
pub struct ProcessControlBlock {
    /// 0 marks the slot free.
    pub pid: u32,
    pub state: ProcessState,
    pub name: [u8; PROCESS_NAME_LEN],
    pub context: Context,
    pub page_directory: Option<PdHandle>,
    /// Virtual base addresses of the frames mapped into this process.
    pub frames: [u32; PROCESS_PAGE_FRAME_COUNT_MAX],
    pub frame_count: usize,
}

impl ProcessControlBlock {
    pub const EMPTY: Self = Self {
        pid: 0,
        state: ProcessState::New,
        name: [0; PROCESS_NAME_LEN],
        context: Context::EMPTY,
        page_directory: None,
        frames: [0; PROCESS_PAGE_FRAME_COUNT_MAX],
        frame_count: 0,
    };

    pub fn is_free(&self) -> bool {
        self.pid == 0
    }

    pub fn is_runnable(&self) -> bool {
        !self.is_free()
            && matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }
}

pub struct ProcessTable {
    pub pcbs: [ProcessControlBlock; PROCESS_COUNT_MAX],
    active_count: usize,
    pid_counter: u32,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            pcbs: [ProcessControlBlock::EMPTY; PROCESS_COUNT_MAX],
            active_count: 0,
            pid_counter: 1,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    fn generate_pid(&mut self) -> u32 {
        let pid = self.pid_counter;
        self.pid_counter += 1;
        pid
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.pcbs.iter().position(|pcb| pcb.is_free())
    }

    pub fn find_by_pid(&self, pid: u32) -> Option<usize> {
        if pid == 0 {
            return None;
        }
        self.pcbs.iter().position(|pcb| pcb.pid == pid)
    }

    /// Frames needed for an executable of `size` bytes plus one stack
    /// frame, all in 4 MiB units.
    pub fn frames_needed(size: u32) -> usize {
        ceil_div(size.saturating_add(PAGE_FRAME_SIZE), PAGE_FRAME_SIZE) as usize
    }

    /// The creation validation ladder, in the order the failure codes are
    /// defined. Returns the frame count to map.
    pub fn validate_create(
        &self,
        entry_vaddr: u32,
        size: u32,
        frames_free: usize,
    ) -> Result<usize, CreateError> {
        if self.active_count >= PROCESS_COUNT_MAX {
            return Err(CreateError::MaxProcessExceeded);
        }
        if entry_vaddr >= KERNEL_VIRTUAL_BASE {
            return Err(CreateError::InvalidEntrypoint);
        }
        let frames = Self::frames_needed(size);
        if frames > PROCESS_PAGE_FRAME_COUNT_MAX || frames > frames_free {
            return Err(CreateError::NotEnoughMemory);
        }
        Ok(frames)
    }

    /// Render the `name (PID: n) - STATE` listing.
    pub fn ps(&self, out: &mut SliceWriter) {
        for pcb in self.pcbs.iter().filter(|pcb| !pcb.is_free()) {
            let name_len = pcb.name.iter().position(|&b| b == 0).unwrap_or(PROCESS_NAME_LEN);
            out.push_bytes(&pcb.name[..name_len]);
            let _ = write!(out, " (PID: {}) - {}\n", pcb.pid, pcb.state.as_str());
        }
    }

    /// Install a fully prepared PCB into `slot`.
    fn occupy(
        &mut self,
        slot: usize,
        name: &[u8; PROCESS_NAME_LEN],
        context: Context,
        page_directory: PdHandle,
        frames: &[u32],
    ) -> u32 {
        let pid = self.generate_pid();
        let pcb = &mut self.pcbs[slot];
        pcb.pid = pid;
        pcb.state = ProcessState::Ready;
        pcb.name = *name;
        pcb.context = context;
        pcb.page_directory = Some(page_directory);
        pcb.frames = [0; PROCESS_PAGE_FRAME_COUNT_MAX];
        pcb.frames[..frames.len()].copy_from_slice(frames);
        pcb.frame_count = frames.len();
        self.active_count += 1;
        pid
    }

    /// Release `slot`: unmap its frames, return its page directory, and
    /// zero the PCB. The slot cannot be rescheduled until a new create
    /// rewrites it.
    fn release(&mut self, slot: usize) {
        let pcb = &mut self.pcbs[slot];
        if let Some(handle) = pcb.page_directory.take() {
            for i in 0..pcb.frame_count {
                paging::free_user_frame(handle, pcb.frames[i]);
            }
            paging::free_page_directory(handle);
        }
        *pcb = ProcessControlBlock::EMPTY;
        self.pcbs[slot].state = ProcessState::Terminated;
        self.active_count -= 1;
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

pub static PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

/// Destroy a process by pid, releasing its page directory and frames.
pub fn destroy(pid: u32) -> bool {
    let mut table = PROCESS_TABLE.lock();
    match table.find_by_pid(pid) {
        Some(slot) => {
            log::info!("destroying process {pid}");
            table.release(slot);
            true
        }
        None => false,
    }
}

/// Everything needed to start a program from the filesystem.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub parent_cluster: u32,
    /// Load address and entry point (must be below the kernel half).
    pub entry_vaddr: u32,
    /// Executable image size in bytes.
    pub size: u32,
}

/// Create a process from an executable on the filesystem.
///
/// Validates, builds the address space, loads the image into it (through a
/// temporary cr3 switch), and only then occupies a PCB slot.
#[cfg(target_arch = "x86")]
pub fn create(request: &ExecRequest) -> Result<u32, CreateError> {
    use crate::arch::x86::gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
    use crate::mm::FRAME_ALLOCATOR;

    let mut table = PROCESS_TABLE.lock();
    let frames_free = FRAME_ALLOCATOR.lock().free_count();
    let frame_count = table.validate_create(request.entry_vaddr, request.size, frames_free)?;
    let slot = table.find_free_slot().ok_or(CreateError::MaxProcessExceeded)?;

    let handle = paging::create_page_directory().map_err(|_| CreateError::NotEnoughMemory)?;

    let mut frames = [0u32; PROCESS_PAGE_FRAME_COUNT_MAX];
    for i in 0..frame_count {
        let vaddr = request.entry_vaddr + (i as u32) * PAGE_FRAME_SIZE;
        if paging::allocate_user_frame(handle, vaddr).is_err() {
            unwind_address_space(handle, &frames[..i]);
            return Err(CreateError::NotEnoughMemory);
        }
        frames[i] = vaddr;
    }

    // Load the executable into the new address space. The kernel mappings
    // are present in every directory, so only the user half changes under
    // our feet. The copy is volatile byte stores through raw addresses:
    // the load base is a user virtual address (usually 0), which no
    // reference or slice may legally cover.
    let load_result = {
        let previous = current_page_directory(&table);
        paging::use_page_directory(handle);
        let base = request.entry_vaddr as usize;
        let result = crate::fs::with_driver(|fs| {
            fs.read_streaming(
                &request.name,
                &request.ext,
                request.parent_cluster,
                request.size,
                &mut |offset, chunk| {
                    for (i, &byte) in chunk.iter().enumerate() {
                        // SAFETY: [base, base + size) lies within the user
                        // frames just mapped writable in the active
                        // directory.
                        unsafe {
                            core::ptr::write_volatile((base + offset + i) as *mut u8, byte);
                        }
                    }
                },
            )
            .map(|_| ())
        });
        match previous {
            Some(prev) => paging::use_page_directory(prev),
            None => paging::use_kernel_directory(),
        }
        result
    };
    match load_result {
        Some(Ok(())) => {}
        _ => {
            unwind_address_space(handle, &frames[..frame_count]);
            return Err(CreateError::FsReadFailure);
        }
    }

    let context = Context::user(
        request.entry_vaddr,
        request.entry_vaddr + PAGE_FRAME_SIZE - 4,
        USER_CODE_SELECTOR,
        USER_DATA_SELECTOR,
    );
    let pid = table.occupy(slot, &request.name, context, handle, &frames[..frame_count]);
    log::info!("created process {pid} in slot {slot} ({frame_count} frames)");
    Ok(pid)
}

#[cfg(target_arch = "x86")]
fn unwind_address_space(handle: PdHandle, mapped: &[u32]) {
    for &vaddr in mapped {
        paging::free_user_frame(handle, vaddr);
    }
    paging::free_page_directory(handle);
}

/// Page directory of the process currently on the CPU, if any.
#[cfg(target_arch = "x86")]
fn current_page_directory(table: &ProcessTable) -> Option<PdHandle> {
    crate::sched::current_slot()
        .and_then(|slot| table.pcbs[slot].page_directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::paging::POOL_TEST_LOCK;

    fn dummy_name(tag: u8) -> [u8; PROCESS_NAME_LEN] {
        let mut name = [0u8; PROCESS_NAME_LEN];
        name[0] = b'p';
        name[1] = tag;
        name
    }

    /// Fill a slot without drawing from the global directory pool.
    fn occupy_dummy(table: &mut ProcessTable, tag: u8) -> u32 {
        let slot = table.find_free_slot().unwrap();
        let pid = table.generate_pid();
        let pcb = &mut table.pcbs[slot];
        pcb.pid = pid;
        pcb.state = ProcessState::Ready;
        pcb.name = dummy_name(tag);
        table.active_count += 1;
        pid
    }

    #[test]
    fn pids_are_fresh_and_slots_reused() {
        let mut table = ProcessTable::new();
        let a = occupy_dummy(&mut table, b'a');
        let b = occupy_dummy(&mut table, b'b');
        assert_ne!(a, b);
        assert_eq!(table.active_count(), 2);

        let slot_a = table.find_by_pid(a).unwrap();
        table.release(slot_a);
        assert_eq!(table.active_count(), 1);
        assert!(table.find_by_pid(a).is_none());

        // slot is reusable, pid is not recycled
        let c = occupy_dummy(&mut table, b'c');
        assert!(c > b);
        assert_eq!(table.find_by_pid(c).unwrap(), slot_a);
    }

    #[test]
    fn release_returns_page_directory_to_pool() {
        let _guard = POOL_TEST_LOCK.lock();
        let mut table = ProcessTable::new();
        let before = paging::used_directory_count();

        let slot = table.find_free_slot().unwrap();
        let handle = paging::create_page_directory().unwrap();
        let pid = table.occupy(slot, &dummy_name(b'x'), Context::EMPTY, handle, &[]);
        assert_eq!(paging::used_directory_count(), before + 1);

        let slot = table.find_by_pid(pid).unwrap();
        table.release(slot);
        assert_eq!(paging::used_directory_count(), before);
        assert_eq!(table.pcbs[slot].state, ProcessState::Terminated);
        assert!(table.pcbs[slot].is_free());
    }

    #[test]
    fn validation_ladder_orders_failures() {
        let mut table = ProcessTable::new();

        // entrypoint in the kernel half
        assert_eq!(
            table.validate_create(KERNEL_VIRTUAL_BASE, 100, 10),
            Err(CreateError::InvalidEntrypoint)
        );

        // more frames than the per-process cap
        let huge = PAGE_FRAME_SIZE * (PROCESS_PAGE_FRAME_COUNT_MAX as u32);
        assert_eq!(table.validate_create(0, huge, 100), Err(CreateError::NotEnoughMemory));

        // more frames than are globally free
        assert_eq!(table.validate_create(0, PAGE_FRAME_SIZE, 1), Err(CreateError::NotEnoughMemory));

        // a full table rejects before anything else
        for i in 0..PROCESS_COUNT_MAX {
            occupy_dummy(&mut table, b'0' + i as u8);
        }
        assert_eq!(
            table.validate_create(KERNEL_VIRTUAL_BASE, 0, 0),
            Err(CreateError::MaxProcessExceeded)
        );

        for pid in 1..=PROCESS_COUNT_MAX as u32 {
            let slot = table.find_by_pid(pid).unwrap();
            table.release(slot);
        }
    }

    #[test]
    fn frames_needed_includes_stack_frame() {
        assert_eq!(ProcessTable::frames_needed(0), 1);
        assert_eq!(ProcessTable::frames_needed(1), 2);
        assert_eq!(ProcessTable::frames_needed(PAGE_FRAME_SIZE), 2);
        assert_eq!(ProcessTable::frames_needed(PAGE_FRAME_SIZE + 1), 3);
    }

    #[test]
    fn ps_lists_live_processes() {
        let mut table = ProcessTable::new();
        let pid = occupy_dummy(&mut table, b'1');
        table.pcbs[table.find_by_pid(pid).unwrap()].state = ProcessState::Running;

        let mut buf = [0u8; 128];
        let mut out = SliceWriter::new(&mut buf);
        table.ps(&mut out);
        let len = out.len();
        let text = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(text, std::format!("p1 (PID: {pid}) - RUNNING\n"));

        let slot = table.find_by_pid(pid).unwrap();
        table.release(slot);
    }
}
