//! 80x25 VGA text-mode framebuffer.
//!
//! Each cell is {ascii, attribute = bg << 4 | fg}; the hardware cursor is
//! moved through the VGA index register pair. The writer carries the
//! cursor position and the prompt anchor the keyboard echo rewinds to.

use core::{fmt, ptr::write_volatile};

use lazy_static::lazy_static;
use spin::Mutex;

use super::{outb, without_interrupts};

pub const MAX_ROW: usize = 25;
pub const MAX_COLUMN: usize = 80;

const CURSOR_PORT_CMD: u16 = 0x3D4;
const CURSOR_PORT_DATA: u16 = 0x3D5;

/// VGA text-mode color palette. Not all variants are used but the full
/// 16-color palette is defined per the VGA specification.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; MAX_COLUMN]; MAX_ROW],
}

pub struct TextWriter {
    pub cur_row: usize,
    pub cur_col: usize,
    /// Where the current input line began; backspace stops here.
    pub start_row: usize,
    pub start_col: usize,
    buffer: &'static mut Buffer,
}

impl TextWriter {
    /// Paint one cell without moving the cursor.
    pub fn write_at(&mut self, row: usize, col: usize, c: u8, fg: u8, bg: u8) {
        if row >= MAX_ROW || col >= MAX_COLUMN {
            return;
        }
        let color_code = (bg << 4) | (fg & 0x0F);
        // SAFETY: the VGA buffer at 0xB8000 is memory-mapped I/O;
        // write_volatile keeps the store. Row/col are bounds-checked above.
        unsafe {
            write_volatile(
                &mut self.buffer.chars[row][col],
                ScreenChar { ascii_character: c, color_code },
            );
        }
    }

    /// Write one character at the cursor with the given foreground color,
    /// advancing, wrapping, and scrolling like a teletype.
    pub fn putchar(&mut self, c: u8, fg: u8) {
        if c != b'\n' {
            self.write_at(self.cur_row, self.cur_col, c, fg, 0);
        }
        if self.cur_col == MAX_COLUMN - 1 || c == b'\n' {
            self.cur_col = 0;
            self.cur_row += 1;
            while self.cur_row >= MAX_ROW {
                self.scroll_up();
            }
        } else {
            self.cur_col += 1;
        }
    }

    /// Write a NUL-terminated-or-full byte string at the cursor, then move
    /// the hardware cursor after it.
    pub fn puts(&mut self, s: &[u8], fg: u8) {
        for &c in s {
            if c == 0 {
                break;
            }
            self.putchar(c, fg);
        }
        self.update_cursor();
    }

    /// Shift every row up by one and blank the last row.
    fn scroll_up(&mut self) {
        for row in 1..MAX_ROW {
            for col in 0..MAX_COLUMN {
                // SAFETY: volatile copy within the bounds-checked VGA
                // buffer; row starts at 1 so row - 1 is in range.
                let c = unsafe { core::ptr::read_volatile(&self.buffer.chars[row][col]) };
                // SAFETY: as above.
                unsafe {
                    write_volatile(&mut self.buffer.chars[row - 1][col], c);
                }
            }
        }
        for col in 0..MAX_COLUMN {
            self.write_at(MAX_ROW - 1, col, b' ', 0x07, 0);
        }
        self.cur_row -= 1;
        self.start_row = self.start_row.saturating_sub(1);
    }

    /// Blank the whole screen and home the cursor.
    pub fn clear(&mut self) {
        for row in 0..MAX_ROW {
            for col in 0..MAX_COLUMN {
                self.write_at(row, col, 0, 0x07, 0);
            }
        }
        self.cur_row = 0;
        self.cur_col = 0;
        self.start_row = 0;
        self.start_col = 0;
        self.update_cursor();
    }

    /// Anchor the input line at the current cursor position.
    pub fn anchor_prompt(&mut self) {
        self.start_row = self.cur_row;
        self.start_col = self.cur_col;
        self.update_cursor();
    }

    /// Erase one character before the cursor, stopping at the prompt
    /// anchor. Returns false when already at the anchor.
    pub fn erase_back(&mut self) -> bool {
        if self.cur_row == self.start_row && self.cur_col <= self.start_col {
            return false;
        }
        if self.cur_col == 0 {
            self.cur_row -= 1;
            self.cur_col = MAX_COLUMN - 1;
        } else {
            self.cur_col -= 1;
        }
        self.write_at(self.cur_row, self.cur_col, b' ', 0x0F, 0);
        self.update_cursor();
        true
    }

    /// Move the blinking hardware cursor to the writer's position.
    pub fn update_cursor(&mut self) {
        let pos = (self.cur_row * MAX_COLUMN + self.cur_col) as u16;
        // SAFETY: index/data writes to the VGA CRT controller registers
        // 0x0F (cursor low) and 0x0E (cursor high).
        unsafe {
            outb(CURSOR_PORT_CMD, 0x0F);
            outb(CURSOR_PORT_DATA, (pos & 0xFF) as u8);
            outb(CURSOR_PORT_CMD, 0x0E);
            outb(CURSOR_PORT_DATA, ((pos >> 8) & 0xFF) as u8);
        }
    }
}

impl fmt::Write for TextWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.putchar(byte, 0x0F),
                _ => self.putchar(0xfe, 0x0F),
            }
        }
        self.update_cursor();
        Ok(())
    }
}

lazy_static! {
    pub static ref WRITER: Mutex<TextWriter> = Mutex::new(TextWriter {
        cur_row: 0,
        cur_col: 0,
        start_row: 0,
        start_col: 0,
        // SAFETY: physical 0xB8000 is the VGA text buffer, reached through
        // the higher-half kernel mapping so it stays visible from every
        // address space; access is serialized by the enclosing Mutex.
        buffer: unsafe { &mut *((crate::config::KERNEL_VIRTUAL_BASE + 0xB8000) as *mut Buffer) },
    });
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    without_interrupts(|| {
        WRITER.lock().write_fmt(args).expect("VGA write_fmt failed");
    });
}
