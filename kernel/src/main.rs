//! Kernel binary entry point.
//!
//! `_start` (trampoline.s) hands control to [`kernel_main`] with a stack
//! and the boot loader's higher-half mappings in place. Bring-up order:
//! descriptor tables and PIC, logging, filesystem, keyboard, then the
//! first user process (the shell) and the scheduler, which never returns.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_arch = "x86")]
use ferrite_kernel::{arch, drivers::keyboard, fs, log_service, println, process, sched};

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    #[cfg(target_arch = "x86")]
    println!("[KERNEL PANIC] {}", info);

    ferrite_kernel::arch::halt();
}

#[cfg(target_arch = "x86")]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    use ferrite_kernel::arch::x86;
    use ferrite_kernel::fs::fat32::ROOT_CLUSTER_NUMBER;
    use ferrite_kernel::process::ExecRequest;

    log_service::init();
    log::info!("ferrite v{} booting", env!("CARGO_PKG_VERSION"));

    x86::init();

    {
        let mut writer = x86::vga::WRITER.lock();
        writer.clear();
    }
    println!("ferrite v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = fs::init() {
        log::error!("filesystem mount failed: {err:?}");
        arch::halt();
    }

    x86::pic::unmask(x86::pic::IRQ_KEYBOARD);
    keyboard::activate();
    x86::enable_interrupts();

    // The shell binary sits in the root directory; it is loaded at
    // virtual 0 and entered in ring 3.
    let shell = ExecRequest {
        name: *b"shell\0\0\0",
        ext: [0; 3],
        parent_cluster: ROOT_CLUSTER_NUMBER,
        entry_vaddr: 0,
        size: 0x10_0000, // up to 1 MiB image
    };
    match process::create(&shell) {
        Ok(pid) => log::info!("shell ready (pid {pid})"),
        Err(err) => {
            log::error!("cannot start shell: {err:?}");
            arch::halt();
        }
    }

    sched::init();
    sched::switch_to_next();
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("ferrite-kernel must be built for the bare-metal i686 target");
    std::process::exit(1);
}
