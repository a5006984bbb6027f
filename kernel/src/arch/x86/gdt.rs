// Global Descriptor Table

use bitflags::bitflags;
use lazy_static::lazy_static;

/// GDT slot count. Only entries 0..=5 are populated; the rest stay null.
const GDT_MAX_ENTRY_COUNT: usize = 32;

/// Selector layout:
/// - 0x00: Null descriptor
/// - 0x08: Kernel code segment (Ring 0)
/// - 0x10: Kernel data segment (Ring 0)
/// - 0x18: User code segment (Ring 3, selector 0x1B with RPL)
/// - 0x20: User data segment (Ring 3, selector 0x23 with RPL)
/// - 0x28: TSS
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

bitflags! {
    /// Access byte of a segment descriptor (Intel SDM vol. 3, fig. 3-8).
    #[derive(Debug, Clone, Copy)]
    struct Access: u8 {
        const ACCESSED   = 1 << 0;
        const READ_WRITE = 1 << 1;
        const EXECUTABLE = 1 << 3;
        const NON_SYSTEM = 1 << 4;
        const DPL_RING3  = 3 << 5;
        const PRESENT    = 1 << 7;
    }
}

/// One 8-byte segment descriptor, encoded exactly as the CPU reads it.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
struct SegmentDescriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    // low nibble: limit bits 16..19; high nibble: AVL/L/DB/G flags
    granularity: u8,
    base_high: u8,
}

impl SegmentDescriptor {
    const NULL: Self = Self {
        limit_low: 0,
        base_low: 0,
        base_mid: 0,
        access: 0,
        granularity: 0,
        base_high: 0,
    };

    /// Flat 4 GiB code/data segment: limit 0xFFFFF, 4 KiB granularity,
    /// 32-bit default operation size.
    const fn flat(access: Access) -> Self {
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access: access.bits(),
            granularity: 0xCF,
            base_high: 0,
        }
    }

    /// Byte-granular system segment holding the TSS.
    fn tss(base: u32, limit: u32) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            // P=1, DPL=0, 32-bit available TSS (type 0x9)
            access: 0x89,
            // D/B set, G clear, limit bits 16..19
            granularity: 0x40 | (((limit >> 16) & 0xF) as u8),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// 32-bit Task State Segment. Only `ss0`/`esp0` matter here: they name the
/// stack the CPU switches to on a ring-3 -> ring-0 trap.
#[repr(C)]
pub struct TaskStateSegment {
    prev_tss: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            prev_tss: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: core::mem::size_of::<TaskStateSegment>() as u16,
        }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    // GDTR.size is the table size minus one
    size: u16,
    offset: u32,
}

// Sized for the recursive filesystem walks: each search level keeps a
// directory table and a file buffer on the stack.
const KERNEL_STACK_SIZE: usize = 4096 * 64;

#[repr(align(16))]
struct AlignedStack([u8; KERNEL_STACK_SIZE]);

/// Stack the CPU lands on for every ring-3 -> ring-0 transition.
static mut KERNEL_STACK: AlignedStack = AlignedStack([0; KERNEL_STACK_SIZE]);

/// Top of the kernel interrupt stack.
pub fn kernel_stack_top() -> u32 {
    let base = &raw const KERNEL_STACK as u32;
    base + KERNEL_STACK_SIZE as u32
}

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        tss.ss0 = KERNEL_DATA_SELECTOR as u32;
        tss.esp0 = kernel_stack_top();
        tss
    };
}

lazy_static! {
    static ref GDT: [SegmentDescriptor; GDT_MAX_ENTRY_COUNT] = {
        let mut table = [SegmentDescriptor::NULL; GDT_MAX_ENTRY_COUNT];
        table[1] = SegmentDescriptor::flat(
            Access::PRESENT | Access::NON_SYSTEM | Access::EXECUTABLE | Access::READ_WRITE,
        );
        table[2] =
            SegmentDescriptor::flat(Access::PRESENT | Access::NON_SYSTEM | Access::READ_WRITE);
        table[3] = SegmentDescriptor::flat(
            Access::PRESENT
                | Access::NON_SYSTEM
                | Access::EXECUTABLE
                | Access::READ_WRITE
                | Access::DPL_RING3,
        );
        table[4] = SegmentDescriptor::flat(
            Access::PRESENT | Access::NON_SYSTEM | Access::READ_WRITE | Access::DPL_RING3,
        );
        // The TSS descriptor base can only be known at runtime.
        let tss_base = &*TSS as *const TaskStateSegment as u32;
        table[5] =
            SegmentDescriptor::tss(tss_base, core::mem::size_of::<TaskStateSegment>() as u32 - 1);
        table
    };
}

extern "C" {
    /// Loads GDTR and reloads every segment register via a far jump
    /// (trampoline.s).
    fn gdt_load(pointer: *const GdtPointer);
}

/// Install the GDT and load the task register.
pub fn init() {
    let pointer = GdtPointer {
        size: core::mem::size_of::<[SegmentDescriptor; GDT_MAX_ENTRY_COUNT]>() as u16 - 1,
        offset: GDT.as_ptr() as u32,
    };
    // SAFETY: the pointer references the static GDT, which lives for the
    // whole kernel lifetime; gdt_load reloads CS/DS/ES/FS/GS/SS with the
    // kernel selectors defined above.
    unsafe {
        gdt_load(&pointer);
        core::arch::asm!("ltr ax", in("ax") TSS_SELECTOR, options(nomem, nostack));
    }
}

/// Refresh the kernel stack pointer in the TSS (ESP0).
///
/// Called before every return to ring 3 so the next trap lands on a fresh
/// kernel stack.
pub fn set_kernel_stack(stack_top: u32) {
    // SAFETY: the TSS is a static initialized at boot. This runs with
    // interrupts disabled on the single CPU, so no concurrent access to
    // esp0 is possible.
    unsafe {
        let tss_ptr = &*TSS as *const TaskStateSegment as *mut TaskStateSegment;
        (*tss_ptr).esp0 = stack_top;
    }
}
