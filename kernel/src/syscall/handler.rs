//! Kernel-side syscall services.
//!
//! Every pointer argument is a user-space virtual address in the calling
//! process's address space, which is the one loaded while the trap runs.
//! This kernel trusts its single user program (there is no copy-in/out
//! validation layer); each dereference states that assumption.

use core::slice;

use super::{RawDriverRequest, Syscall, OUTPUT_BUFFER_LEN};
use crate::arch::context::InterruptFrame;
use crate::arch::x86::{rtc, vga};
use crate::drivers::keyboard;
use crate::fs::fat32::{
    delete_wire_code, read_directory_wire_code, read_wire_code, write_wire_code, CLUSTER_SIZE,
};
use crate::fs;
use crate::fs::walk::{self, SearchAlgorithm};
use crate::process::{self, ExecRequest};
use crate::util::SliceWriter;

/// Dispatch a syscall trap frame. Unknown numbers fall through silently.
pub fn handle(frame: &mut InterruptFrame) {
    let Ok(call) = Syscall::try_from(frame.registers.eax) else {
        return;
    };
    let (ebx, ecx, edx) = (frame.registers.ebx, frame.registers.ecx, frame.registers.edx);

    match call {
        Syscall::ReadFile => sys_read(ebx, ecx),
        Syscall::ReadDirectory => sys_read_directory(ebx, ecx),
        Syscall::Write => sys_write(ebx, ecx),
        Syscall::Delete => sys_delete(ebx, ecx),
        Syscall::GetKeyboardChar => sys_get_keyboard_char(ebx, ecx),
        Syscall::PutChar => sys_putchar(ebx, ecx),
        Syscall::PutString => sys_puts(ebx, ecx, edx),
        Syscall::ActivateKeyboard => keyboard::activate(),
        Syscall::ResolveChildDirectory => sys_resolve_child(ebx, ecx),
        Syscall::ResolveParentDirectory => sys_resolve_parent(ebx, ecx),
        Syscall::ListDirectory => sys_list_directory(ebx, ecx),
        Syscall::PrintTree => sys_print_tree(ebx, ecx),
        Syscall::SearchTextBm => sys_search(ebx, ecx, edx, SearchAlgorithm::BoyerMoore),
        Syscall::ClearScreen => vga::WRITER.lock().clear(),
        Syscall::Kill => {
            process::destroy(ebx);
        }
        Syscall::Exec => sys_exec(ebx),
        Syscall::ProcessList => sys_process_list(ebx),
        Syscall::ReadClock => sys_read_clock(ebx, ecx, edx),
        Syscall::PrintPathToTarget => sys_path_to_target(ebx, ecx, edx),
        Syscall::SearchTextKmp => sys_search(ebx, ecx, edx, SearchAlgorithm::KnuthMorrisPratt),
    }
}

/// # Safety contract for the helpers below
///
/// The calling process supplied these addresses; they lie in its mapped
/// user frames (or the call harmlessly reads/writes its own memory).

unsafe fn user_request(addr: u32) -> RawDriverRequest {
    // SAFETY: caller-supplied request pointer, repr(C) layout shared with
    // the user-side definition.
    unsafe { *(addr as *const RawDriverRequest) }
}

unsafe fn put_i8(addr: u32, value: i8) {
    // SAFETY: caller-supplied result pointer.
    unsafe { *(addr as *mut i8) = value }
}

unsafe fn put_u32(addr: u32, value: u32) {
    // SAFETY: caller-supplied result pointer.
    unsafe { *(addr as *mut u32) = value }
}

unsafe fn user_bytes<'a>(addr: u32, len: usize) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    // SAFETY: caller-supplied buffer of `len` bytes.
    unsafe { slice::from_raw_parts(addr as *const u8, len) }
}

unsafe fn user_bytes_mut<'a>(addr: u32, len: usize) -> &'a mut [u8] {
    if len == 0 {
        return &mut [];
    }
    // SAFETY: caller-supplied writable buffer of `len` bytes.
    unsafe { slice::from_raw_parts_mut(addr as *mut u8, len) }
}

/// Read a NUL-terminated user string, bounded.
unsafe fn user_cstr<'a>(addr: u32, max: usize) -> &'a [u8] {
    // SAFETY: caller-supplied string pointer; scan stops at NUL or max.
    unsafe {
        let mut len = 0;
        while len < max && *((addr + len as u32) as *const u8) != 0 {
            len += 1;
        }
        slice::from_raw_parts(addr as *const u8, len)
    }
}

fn sys_read(request_addr: u32, retcode_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        let buf = user_bytes_mut(request.buf, request.buffer_size as usize);
        let code = match fs::with_driver(|fs| {
            fs.read(&request.name, &request.ext, request.parent_cluster, buf)
        }) {
            Some(result) => read_wire_code(&result),
            None => -1,
        };
        put_i8(retcode_addr, code);
    }
}

fn sys_read_directory(request_addr: u32, retcode_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        if (request.buffer_size as usize) < CLUSTER_SIZE {
            put_i8(retcode_addr, -1);
            return;
        }
        let result = match fs::with_driver(|fs| {
            fs.read_directory(&request.name, &request.ext, request.parent_cluster)
        }) {
            Some(result) => result,
            None => {
                put_i8(retcode_addr, -1);
                return;
            }
        };
        let code = read_directory_wire_code(&result);
        if let Ok(table) = result {
            let buf = user_bytes_mut(request.buf, CLUSTER_SIZE);
            buf.copy_from_slice(&table.to_bytes());
        }
        put_i8(retcode_addr, code);
    }
}

fn sys_write(request_addr: u32, retcode_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        let data = user_bytes(request.buf, request.buffer_size as usize);
        let code = match fs::with_driver(|fs| {
            fs.write(&request.name, &request.ext, request.parent_cluster, data)
        }) {
            Some(result) => write_wire_code(&result),
            None => -1,
        };
        put_i8(retcode_addr, code);
    }
}

fn sys_delete(request_addr: u32, retcode_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        let code = match fs::with_driver(|fs| {
            fs.delete(&request.name, &request.ext, request.parent_cluster)
        }) {
            Some(result) => delete_wire_code(&result),
            None => -1,
        };
        put_i8(retcode_addr, code);
    }
}

fn sys_get_keyboard_char(char_addr: u32, retcode_addr: u32) {
    let mut ch = 0u8;
    let code = keyboard::read_char(&mut ch);
    // SAFETY: user pointers per the module contract.
    unsafe {
        *(char_addr as *mut u8) = ch;
        *(retcode_addr as *mut i32) = code;
    }
}

fn sys_putchar(ch: u32, color: u32) {
    let mut writer = vga::WRITER.lock();
    writer.putchar(ch as u8, color as u8);
    writer.update_cursor();
}

fn sys_puts(text_addr: u32, len: u32, color: u32) {
    // SAFETY: user pointer per the module contract.
    let text = unsafe { user_bytes(text_addr, len as usize) };
    vga::WRITER.lock().puts(text, color as u8);
}

fn sys_resolve_child(request_addr: u32, out_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        let cluster = fs::with_driver(|fs| {
            fs.resolve_child(&request.name, request.parent_cluster).unwrap_or(0)
        })
        .unwrap_or(0);
        put_u32(out_addr, cluster);
    }
}

fn sys_resolve_parent(request_addr: u32, out_addr: u32) {
    // SAFETY: user pointers per the module contract.
    unsafe {
        let request = user_request(request_addr);
        let cluster = fs::with_driver(|fs| {
            fs.resolve_parent(request.parent_cluster).unwrap_or(request.parent_cluster)
        })
        .unwrap_or(request.parent_cluster);
        put_u32(out_addr, cluster);
    }
}

fn sys_list_directory(out_addr: u32, cluster: u32) {
    // SAFETY: user pointer per the module contract; the shell's listing
    // buffers are OUTPUT_BUFFER_LEN bytes.
    let buf = unsafe { user_bytes_mut(out_addr, OUTPUT_BUFFER_LEN) };
    buf.fill(0);
    let mut out = SliceWriter::new(buf);
    fs::with_driver(|fs| {
        let _ = walk::list_dir_content(fs, &mut out, cluster);
    });
}

fn sys_print_tree(out_addr: u32, cluster: u32) {
    // SAFETY: as in sys_list_directory.
    let buf = unsafe { user_bytes_mut(out_addr, OUTPUT_BUFFER_LEN) };
    buf.fill(0);
    let mut out = SliceWriter::new(buf);
    fs::with_driver(|fs| {
        let _ = walk::print_tree(fs, &mut out, cluster);
    });
}

fn sys_search(out_addr: u32, cluster: u32, pattern_addr: u32, algorithm: SearchAlgorithm) {
    // SAFETY: as in sys_list_directory; the pattern is NUL-terminated.
    let (buf, pattern) = unsafe {
        (
            user_bytes_mut(out_addr, OUTPUT_BUFFER_LEN),
            user_cstr(pattern_addr, crate::fs::search::PATTERN_MAX_LEN),
        )
    };
    buf.fill(0);
    let mut out = SliceWriter::new(buf);
    fs::with_driver(|fs| {
        let _ = walk::search_text(fs, &mut out, cluster, pattern, algorithm);
    });
}

fn sys_path_to_target(out_addr: u32, cluster: u32, target_addr: u32) {
    // SAFETY: as in sys_list_directory; the target name is NUL-terminated.
    let (buf, target) = unsafe {
        (user_bytes_mut(out_addr, OUTPUT_BUFFER_LEN), user_cstr(target_addr, 8))
    };
    buf.fill(0);
    let mut out = SliceWriter::new(buf);
    fs::with_driver(|fs| {
        let _ = walk::print_path_to_target(fs, &mut out, cluster, target);
    });
}

fn sys_exec(request_addr: u32) {
    // SAFETY: user pointer per the module contract.
    let request = unsafe { user_request(request_addr) };
    let exec = ExecRequest {
        name: request.name,
        ext: request.ext,
        parent_cluster: request.parent_cluster,
        entry_vaddr: request.buf,
        size: request.buffer_size,
    };
    if let Err(err) = process::create(&exec) {
        log::warn!("exec failed: {err:?}");
    }
}

fn sys_process_list(out_addr: u32) {
    // SAFETY: as in sys_list_directory.
    let buf = unsafe { user_bytes_mut(out_addr, OUTPUT_BUFFER_LEN) };
    buf.fill(0);
    let mut out = SliceWriter::new(buf);
    process::PROCESS_TABLE.lock().ps(&mut out);
}

fn sys_read_clock(hour_addr: u32, minute_addr: u32, second_addr: u32) {
    let time = rtc::read();
    // SAFETY: user pointers per the module contract.
    unsafe {
        *(hour_addr as *mut u8) = time.hour;
        *(minute_addr as *mut u8) = time.minute;
        *(second_addr as *mut u8) = time.second;
    }

    // paint HH:MM:SS in the bottom-right corner
    let digits = [
        b'0' + time.hour / 10,
        b'0' + time.hour % 10,
        b':',
        b'0' + time.minute / 10,
        b'0' + time.minute % 10,
        b':',
        b'0' + time.second / 10,
        b'0' + time.second % 10,
    ];
    let mut writer = vga::WRITER.lock();
    let row = vga::MAX_ROW - 1;
    let col = vga::MAX_COLUMN - digits.len();
    for (i, &d) in digits.iter().enumerate() {
        writer.write_at(row, col + i, d, 0x0A, 0x00);
    }
}
