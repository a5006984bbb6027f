//! Central interrupt dispatcher.
//!
//! Every ISR stub funnels into [`main_interrupt_handler`] with the full
//! trap frame. The dispatcher fans out on the vector number: timer,
//! keyboard, syscall. Anything else is silently ignored (CPU faults are
//! not yet classified).

use crate::arch::context::InterruptFrame;
use crate::arch::x86::gdt::USER_CODE_SELECTOR;
use crate::arch::x86::{pic, timer};
use crate::drivers::keyboard;
use crate::{sched, syscall};

const TIMER_VECTOR: u32 = (pic::PIC1_OFFSET + pic::IRQ_TIMER) as u32;
const KEYBOARD_VECTOR: u32 = (pic::PIC1_OFFSET + pic::IRQ_KEYBOARD) as u32;
const SYSCALL_VECTOR: u32 = crate::arch::x86::idt::SYSCALL_VECTOR as u32;

/// Called from the assembly stubs with the frame they built.
#[no_mangle]
pub extern "C" fn main_interrupt_handler(frame: &mut InterruptFrame) {
    match frame.int_number {
        TIMER_VECTOR => {
            pic::ack(pic::IRQ_TIMER);
            timer::tick();
            // Only a tick that interrupted ring 3 reschedules: the frame
            // then carries the full user context (esp/ss included), and
            // kernel code is never preempted mid-path.
            if frame.int_stack.cs == USER_CODE_SELECTOR as u32 {
                sched::save_current_context(frame);
                sched::switch_to_next();
            }
        }
        KEYBOARD_VECTOR => {
            keyboard::handle_interrupt();
            pic::ack(pic::IRQ_KEYBOARD);
        }
        SYSCALL_VECTOR => syscall::handle(frame),
        _ => {}
    }
}
