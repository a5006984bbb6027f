//! Raw syscall interface for the ferrite kernel.
//!
//! Every call is `int 0x30` with the number in eax and arguments in
//! ebx/ecx/edx. Results come back through pointers we pass in. This is a
//! self-contained copy of the kernel-side ABI definitions so the shell
//! builds as a standalone `no_std` binary.

/// Listing syscalls fill buffers of exactly this size.
pub const OUTPUT_BUFFER_LEN: usize = 4096;

/// Filesystem request, field order shared with the kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DriverRequest {
    pub buf: u32,
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub parent_cluster: u32,
    pub buffer_size: u32,
}

impl DriverRequest {
    pub fn new(name: &[u8], ext: &[u8], parent_cluster: u32, buf: u32, buffer_size: u32) -> Self {
        let mut name8 = [0u8; 8];
        let n = name.len().min(8);
        name8[..n].copy_from_slice(&name[..n]);
        let mut ext3 = [0u8; 3];
        let n = ext.len().min(3);
        ext3[..n].copy_from_slice(&ext[..n]);
        Self {
            buf,
            name: name8,
            ext: ext3,
            parent_cluster,
            buffer_size,
        }
    }
}

/// Raise `int 0x30`.
///
/// ebx is staged through a scratch register because LLVM reserves it on
/// 32-bit x86.
#[inline(always)]
unsafe fn syscall3(number: u32, ebx: u32, ecx: u32, edx: u32) {
    // SAFETY: the caller guarantees the pointers packed into the argument
    // registers are valid for the requested call.
    unsafe {
        core::arch::asm!(
            "push ebx",
            "mov ebx, {b}",
            "int 0x30",
            "pop ebx",
            b = in(reg) ebx,
            in("eax") number,
            in("ecx") ecx,
            in("edx") edx,
        );
    }
}

pub fn read(request: &DriverRequest) -> i8 {
    let mut retcode: i8 = -1;
    // SAFETY: request and retcode outlive the trap.
    unsafe {
        syscall3(0, request as *const _ as u32, &mut retcode as *mut _ as u32, 0);
    }
    retcode
}

pub fn read_directory(request: &DriverRequest) -> i8 {
    let mut retcode: i8 = -1;
    // SAFETY: request and retcode outlive the trap.
    unsafe {
        syscall3(1, request as *const _ as u32, &mut retcode as *mut _ as u32, 0);
    }
    retcode
}

pub fn write(request: &DriverRequest) -> i8 {
    let mut retcode: i8 = -1;
    // SAFETY: request and retcode outlive the trap.
    unsafe {
        syscall3(2, request as *const _ as u32, &mut retcode as *mut _ as u32, 0);
    }
    retcode
}

pub fn delete(request: &DriverRequest) -> i8 {
    let mut retcode: i8 = -1;
    // SAFETY: request and retcode outlive the trap.
    unsafe {
        syscall3(3, request as *const _ as u32, &mut retcode as *mut _ as u32, 0);
    }
    retcode
}

/// Poll one key from the kernel's rendezvous buffer.
pub fn get_key() -> Option<u8> {
    let mut ch: u8 = 0;
    let mut retcode: i32 = -1;
    // SAFETY: both out-pointers outlive the trap.
    unsafe {
        syscall3(4, &mut ch as *mut _ as u32, &mut retcode as *mut _ as u32, 0);
    }
    if retcode == 0 {
        Some(ch)
    } else {
        None
    }
}

pub fn putchar(c: u8, color: u8) {
    // SAFETY: value arguments only.
    unsafe { syscall3(5, c as u32, color as u32, 0) }
}

pub fn puts(text: &[u8], color: u8) {
    // SAFETY: the slice outlives the trap.
    unsafe { syscall3(6, text.as_ptr() as u32, text.len() as u32, color as u32) }
}

pub fn activate_keyboard() {
    // SAFETY: no arguments.
    unsafe { syscall3(7, 0, 0, 0) }
}

/// Cluster of a child directory; 0 when it does not exist.
pub fn resolve_child(request: &DriverRequest) -> u32 {
    let mut cluster: u32 = 0;
    // SAFETY: request and out-pointer outlive the trap.
    unsafe {
        syscall3(8, request as *const _ as u32, &mut cluster as *mut _ as u32, 0);
    }
    cluster
}

/// Cluster of the `..` parent of `request.parent_cluster`.
pub fn resolve_parent(request: &DriverRequest) -> u32 {
    let mut cluster: u32 = 0;
    // SAFETY: request and out-pointer outlive the trap.
    unsafe {
        syscall3(9, request as *const _ as u32, &mut cluster as *mut _ as u32, 0);
    }
    cluster
}

pub fn list_directory(out: &mut [u8; OUTPUT_BUFFER_LEN], cluster: u32) {
    // SAFETY: the buffer outlives the trap and has the agreed length.
    unsafe { syscall3(10, out.as_mut_ptr() as u32, cluster, 0) }
}

pub fn print_tree(out: &mut [u8; OUTPUT_BUFFER_LEN], cluster: u32) {
    // SAFETY: as in list_directory.
    unsafe { syscall3(11, out.as_mut_ptr() as u32, cluster, 0) }
}

/// Recursive text search, Boyer-Moore flavor. `pattern` is NUL-terminated.
pub fn search_bm(out: &mut [u8; OUTPUT_BUFFER_LEN], cluster: u32, pattern: &[u8]) {
    // SAFETY: buffers outlive the trap; pattern carries its NUL.
    unsafe { syscall3(12, out.as_mut_ptr() as u32, cluster, pattern.as_ptr() as u32) }
}

/// Recursive text search, Knuth-Morris-Pratt flavor.
pub fn search_kmp(out: &mut [u8; OUTPUT_BUFFER_LEN], cluster: u32, pattern: &[u8]) {
    // SAFETY: as in search_bm.
    unsafe { syscall3(19, out.as_mut_ptr() as u32, cluster, pattern.as_ptr() as u32) }
}

pub fn clear_screen() {
    // SAFETY: no arguments.
    unsafe { syscall3(13, 0, 0, 0) }
}

pub fn kill(pid: u32) {
    // SAFETY: value argument only.
    unsafe { syscall3(14, pid, 0, 0) }
}

pub fn exec(request: &DriverRequest) {
    // SAFETY: the request outlives the trap.
    unsafe { syscall3(15, request as *const _ as u32, 0, 0) }
}

pub fn ps(out: &mut [u8; OUTPUT_BUFFER_LEN]) {
    // SAFETY: as in list_directory.
    unsafe { syscall3(16, out.as_mut_ptr() as u32, 0, 0) }
}

/// Read the wall clock; also paints HH:MM:SS in the screen corner.
pub fn read_clock() -> (u8, u8, u8) {
    let (mut h, mut m, mut s) = (0u8, 0u8, 0u8);
    // SAFETY: the three out-pointers outlive the trap.
    unsafe {
        syscall3(
            17,
            &mut h as *mut _ as u32,
            &mut m as *mut _ as u32,
            &mut s as *mut _ as u32,
        );
    }
    (h, m, s)
}

/// Print the indented path down to `target` (NUL-terminated name).
pub fn path_to_target(out: &mut [u8; OUTPUT_BUFFER_LEN], cluster: u32, target: &[u8]) {
    // SAFETY: as in search_bm.
    unsafe { syscall3(18, out.as_mut_ptr() as u32, cluster, target.as_ptr() as u32) }
}
