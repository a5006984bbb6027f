//! Round-robin scheduler.
//!
//! Driven by the PIT at 1 kHz. On a tick that interrupted user code the
//! dispatcher saves the trapped context into the current PCB and calls
//! [`switch_to_next`], which advances to the next runnable slot, switches
//! cr3, refreshes ESP0, and irets through the context trampoline. Kernel
//! code is never preempted: ticks that land in ring 0 only ack.

use spin::Mutex;

struct SchedulerState {
    /// PCB slot currently on the CPU.
    current: Option<usize>,
}

static SCHEDULER: Mutex<SchedulerState> = Mutex::new(SchedulerState { current: None });

/// Slot of the process currently on the CPU.
pub fn current_slot() -> Option<usize> {
    SCHEDULER.lock().current
}

/// Round-robin selection: the first runnable slot strictly after
/// `current`, wrapping, so terminated and free slots are skipped on the
/// way around.
pub fn next_runnable(runnable: &[bool], current: Option<usize>) -> Option<usize> {
    let n = runnable.len();
    if n == 0 {
        return None;
    }
    let start = current.map(|c| c + 1).unwrap_or(0);
    (0..n).map(|offset| (start + offset) % n).find(|&i| runnable[i])
}

/// Program the PIT and open the timer IRQ line.
#[cfg(target_arch = "x86")]
pub fn init() {
    crate::arch::x86::timer::activate();
    log::info!("scheduler: PIT at {} Hz", crate::config::PIT_TIMER_FREQUENCY);
}

/// Capture the interrupted user context into the current PCB. Must run
/// before any kernel code mutates the registers the scheduler restores.
#[cfg(target_arch = "x86")]
pub fn save_current_context(frame: &crate::arch::context::InterruptFrame) {
    use crate::arch::context::Context;
    use crate::process::PROCESS_TABLE;

    let Some(slot) = current_slot() else {
        return;
    };
    let mut table = PROCESS_TABLE.lock();
    let pcb = &mut table.pcbs[slot];
    if pcb.is_runnable() {
        pcb.context = Context::from_interrupt_frame(frame);
    }
}

/// Advance to the next runnable process and enter it. Never returns; the
/// interrupted kernel stack is abandoned after ESP0 is refreshed.
#[cfg(target_arch = "x86")]
pub fn switch_to_next() -> ! {
    use crate::arch::context::process_context_switch;
    use crate::arch::x86::gdt;
    use crate::config::PROCESS_COUNT_MAX;
    use crate::mm::paging;
    use crate::process::{ProcessState, PROCESS_TABLE};

    let picked = {
        let mut table = PROCESS_TABLE.lock();
        let mut sched = SCHEDULER.lock();

        let runnable: [bool; PROCESS_COUNT_MAX] =
            core::array::from_fn(|i| table.pcbs[i].is_runnable());
        match next_runnable(&runnable, sched.current) {
            Some(next) => {
                if let Some(prev) = sched.current {
                    if prev != next && table.pcbs[prev].state == ProcessState::Running {
                        table.pcbs[prev].state = ProcessState::Ready;
                    }
                }
                table.pcbs[next].state = ProcessState::Running;
                sched.current = Some(next);
                Some((table.pcbs[next].context, table.pcbs[next].page_directory))
            }
            None => {
                sched.current = None;
                None
            }
        }
    };

    let Some((context, page_directory)) = picked else {
        log::warn!("scheduler: no runnable process, idling");
        loop {
            crate::arch::x86::enable_interrupts();
            crate::arch::x86::hlt();
        }
    };

    // The next ring-3 -> ring-0 trap starts from a fresh kernel stack.
    gdt::set_kernel_stack(gdt::kernel_stack_top());
    match page_directory {
        Some(handle) => paging::use_page_directory(handle),
        None => paging::use_kernel_directory(),
    }
    // SAFETY: the context was either built by process creation or captured
    // from a ring-3 trap frame, so its selectors and stack point into the
    // address space just loaded.
    unsafe { process_context_switch(&context) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps() {
        let runnable = [true, true, true];
        assert_eq!(next_runnable(&runnable, None), Some(0));
        assert_eq!(next_runnable(&runnable, Some(0)), Some(1));
        assert_eq!(next_runnable(&runnable, Some(1)), Some(2));
        assert_eq!(next_runnable(&runnable, Some(2)), Some(0));
    }

    #[test]
    fn skips_non_runnable_slots() {
        let runnable = [true, false, true, false];
        assert_eq!(next_runnable(&runnable, Some(0)), Some(2));
        assert_eq!(next_runnable(&runnable, Some(2)), Some(0));
    }

    #[test]
    fn single_process_reschedules_itself() {
        let runnable = [false, true, false];
        assert_eq!(next_runnable(&runnable, Some(1)), Some(1));
    }

    #[test]
    fn no_runnable_slot_yields_none() {
        assert_eq!(next_runnable(&[false, false], Some(0)), None);
        assert_eq!(next_runnable(&[], None), None);
    }
}
