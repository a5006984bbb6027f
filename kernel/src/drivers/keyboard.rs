//! PS/2 keyboard driver.
//!
//! IRQ1 reads the scancode from port 0x60 and decodes it with the
//! `pc_keyboard` state machine (scancode set 1, US layout). Accepted
//! characters land in a single-character rendezvous buffer: the ISR is the
//! producer, syscall 4 the read-and-clear consumer. While input is active
//! the driver echoes to the VGA writer, honoring backspace back to the
//! prompt anchor and deactivating on Enter or Ctrl-C.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::arch::x86::{inb, vga};

const KEYBOARD_DATA_PORT: u16 = 0x60;

struct KeyboardState {
    /// Rendezvous slot; 0 means empty.
    buffer: u8,
    input_on: bool,
    ctrl_on: bool,
}

static STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState {
    buffer: 0,
    input_on: false,
    ctrl_on: false,
});

lazy_static! {
    static ref DECODER: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore)
    );
}

/// Start listening: clear the rendezvous buffer and anchor the prompt at
/// the current cursor so backspace cannot climb into earlier output.
pub fn activate() {
    let mut state = STATE.lock();
    state.buffer = 0;
    state.input_on = true;
    state.ctrl_on = false;
    drop(state);
    vga::WRITER.lock().anchor_prompt();
}

/// Stop listening (Enter, Ctrl-C, or the shell going busy).
pub fn deactivate() {
    STATE.lock().input_on = false;
}

pub fn is_active() -> bool {
    STATE.lock().input_on
}

/// Syscall-4 consumer: copy out the pending character and clear the slot.
/// Returns -1 when no character is pending.
pub fn read_char(out: &mut u8) -> i32 {
    let mut state = STATE.lock();
    *out = state.buffer;
    if state.buffer == 0 {
        -1
    } else {
        state.buffer = 0;
        0
    }
}

/// IRQ1 service: pop one scancode and fold it into the driver state.
pub fn handle_interrupt() {
    // SAFETY: reading port 0x60 pops the keyboard controller's output
    // buffer, which is exactly what the IRQ handler must do.
    let scancode = unsafe { inb(KEYBOARD_DATA_PORT) };

    let mut decoder = DECODER.lock();
    let Ok(Some(event)) = decoder.add_byte(scancode) else {
        return;
    };

    let mut state = STATE.lock();
    if matches!(event.code, KeyCode::LControl | KeyCode::RControl) {
        state.ctrl_on = event.state == KeyState::Down;
        return;
    }
    if !state.input_on {
        return;
    }

    let Some(DecodedKey::Unicode(ch)) = decoder.process_keyevent(event) else {
        return;
    };
    if !ch.is_ascii() {
        return;
    }
    let byte = ch as u8;

    // Ctrl-C kills the input line
    if state.ctrl_on && (byte == b'c' || byte == b'C') {
        state.input_on = false;
        return;
    }

    match byte {
        0x08 => {
            if vga::WRITER.lock().erase_back() {
                state.buffer = 0x08;
            }
        }
        b'\n' | b'\r' => {
            state.buffer = b'\n';
            state.input_on = false;
            let mut writer = vga::WRITER.lock();
            writer.putchar(b'\n', 0x0F);
            writer.update_cursor();
        }
        0x20..=0x7E => {
            state.buffer = byte;
            let mut writer = vga::WRITER.lock();
            writer.putchar(byte, 0x0F);
            writer.update_cursor();
        }
        _ => {}
    }
}
