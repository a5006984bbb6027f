//! CPU context structures shared with the assembly trampolines.
//!
//! Field order is part of the ABI: the interrupt stubs build an
//! [`InterruptFrame`] on the kernel stack by pushing segments after a
//! `pushad`, and `process_context_switch` indexes [`Context`] by byte
//! offset. Changing any layout here requires matching trampoline.s.
//!
//! The structs are plain data and compile everywhere; only the trampoline
//! itself is bare-metal.

/// General-purpose registers in `pushad` memory order (last pushed at the
/// lowest address).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuRegisters {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// esp as captured by pushad; ignored on restore.
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// Data segment registers in stub push order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentRegisters {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
}

/// What the CPU pushed on trap entry. `esp`/`ss` are only valid when the
/// interrupted code ran in ring 3 (the CPU pushes them on a privilege
/// change only).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptStack {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

/// Full trap frame as laid out on the kernel stack by the ISR stubs.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptFrame {
    pub segments: SegmentRegisters,
    pub registers: CpuRegisters,
    pub int_number: u32,
    pub error_code: u32,
    pub int_stack: InterruptStack,
}

/// EFLAGS bit 1 is architecturally fixed to one.
pub const EFLAGS_BASE: u32 = 1 << 1;
/// EFLAGS interrupt-enable flag.
pub const EFLAGS_INTERRUPT_ENABLE: u32 = 1 << 9;

/// A process's saved execution state, restored by
/// [`process_context_switch`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub registers: CpuRegisters,
    pub segments: SegmentRegisters,
    pub eip: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
    pub cs: u32,
}

impl Context {
    pub const EMPTY: Self = Self {
        registers: CpuRegisters {
            edi: 0,
            esi: 0,
            ebp: 0,
            esp_dummy: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
        },
        segments: SegmentRegisters { gs: 0, fs: 0, es: 0, ds: 0 },
        eip: 0,
        eflags: 0,
        esp: 0,
        ss: 0,
        cs: 0,
    };

    /// Fresh user-mode context: entry at `eip`, cleared registers, the
    /// given ring-3 selectors, interrupts enabled.
    pub fn user(eip: u32, esp: u32, code_selector: u16, data_selector: u16) -> Self {
        Self {
            registers: CpuRegisters::default(),
            segments: SegmentRegisters {
                gs: data_selector as u32,
                fs: data_selector as u32,
                es: data_selector as u32,
                ds: data_selector as u32,
            },
            eip,
            eflags: EFLAGS_BASE | EFLAGS_INTERRUPT_ENABLE,
            esp,
            ss: data_selector as u32,
            cs: code_selector as u32,
        }
    }

    /// Capture the interrupted user context from a trap frame. Only valid
    /// for frames taken on a ring transition (user cs), where the CPU
    /// pushed esp/ss.
    pub fn from_interrupt_frame(frame: &InterruptFrame) -> Self {
        Self {
            registers: frame.registers,
            segments: frame.segments,
            eip: frame.int_stack.eip,
            eflags: frame.int_stack.eflags,
            esp: frame.int_stack.esp,
            ss: frame.int_stack.ss,
            cs: frame.int_stack.cs,
        }
    }
}

#[cfg(target_arch = "x86")]
extern "C" {
    /// Restore `ctx` and `iret` into it. Never returns; the current kernel
    /// stack is abandoned (ESP0 must already be refreshed).
    pub fn process_context_switch(ctx: *const Context) -> !;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    // trampoline.s hardcodes these offsets
    #[test]
    fn context_layout_matches_trampoline() {
        assert_eq!(offset_of!(Context, registers), 0);
        assert_eq!(offset_of!(Context, segments), 32);
        assert_eq!(offset_of!(Context, eip), 48);
        assert_eq!(offset_of!(Context, eflags), 52);
        assert_eq!(offset_of!(Context, esp), 56);
        assert_eq!(offset_of!(Context, ss), 60);
        assert_eq!(offset_of!(Context, cs), 64);
    }

    #[test]
    fn interrupt_frame_layout_matches_stub_pushes() {
        assert_eq!(offset_of!(InterruptFrame, segments), 0);
        assert_eq!(offset_of!(InterruptFrame, registers), 16);
        assert_eq!(offset_of!(InterruptFrame, int_number), 48);
        assert_eq!(offset_of!(InterruptFrame, error_code), 52);
        assert_eq!(offset_of!(InterruptFrame, int_stack), 56);
        assert_eq!(size_of::<InterruptFrame>(), 76);
    }

    #[test]
    fn user_context_defaults() {
        let ctx = Context::user(0, 0x40_0000 - 4, 0x1B, 0x23);
        assert_eq!(ctx.eip, 0);
        assert_eq!(ctx.esp, 0x3F_FFFC);
        assert_eq!(ctx.cs, 0x1B);
        assert_eq!(ctx.ss, 0x23);
        assert_eq!(ctx.segments.ds, 0x23);
        assert_ne!(ctx.eflags & EFLAGS_INTERRUPT_ENABLE, 0);
        assert_ne!(ctx.eflags & EFLAGS_BASE, 0);
    }

    #[test]
    fn frame_capture_takes_ring3_stack() {
        let mut frame = InterruptFrame {
            segments: SegmentRegisters { gs: 0x23, fs: 0x23, es: 0x23, ds: 0x23 },
            registers: CpuRegisters { eax: 7, ..Default::default() },
            int_number: 0x20,
            error_code: 0,
            int_stack: InterruptStack {
                eip: 0x1000,
                cs: 0x1B,
                eflags: EFLAGS_BASE | EFLAGS_INTERRUPT_ENABLE,
                esp: 0x3F_0000,
                ss: 0x23,
            },
        };
        frame.registers.ebx = 3;

        let ctx = Context::from_interrupt_frame(&frame);
        assert_eq!(ctx.eip, 0x1000);
        assert_eq!(ctx.esp, 0x3F_0000);
        assert_eq!(ctx.ss, 0x23);
        assert_eq!(ctx.registers.eax, 7);
        assert_eq!(ctx.registers.ebx, 3);
    }
}
