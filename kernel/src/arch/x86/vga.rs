//! VGA text-mode terminal driver: the `putchar`/`clear`/`set_cursor`/
//! `set_color` interface the `TerminalWrite` file description and the
//! `SET_CURSOR`/`SET_COLOR`/`CLEAR` syscalls consume.
//!
//! The buffer sits at physical `0xB8000`; the boot-mapped low-8-MiB region
//! puts it at `KERNEL_VMA + 0xB8000` in kernel space.

use core::{fmt, ptr::write_volatile};

use lazy_static::lazy_static;
use spin::Mutex;

use super::boot::KERNEL_VMA;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;
const VGA_BUFFER_ADDR: usize = (KERNEL_VMA as usize) + 0xB8000;
const VGA_CRTC_INDEX: u16 = 0x3D4;
const VGA_CRTC_DATA: u16 = 0x3D5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct ColorCode(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

struct Terminal {
    row: usize,
    col: usize,
    color: ColorCode,
    buffer: &'static mut Buffer,
}

impl Terminal {
    fn putchar(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            byte => {
                if self.col >= BUFFER_WIDTH {
                    self.newline();
                }
                let (row, col) = (self.row, self.col);
                let color = self.color;
                // SAFETY: 0xB8000 is memory-mapped I/O; row/col are kept
                // within BUFFER_HEIGHT/BUFFER_WIDTH by the bounds checks
                // above and in `newline`.
                unsafe {
                    write_volatile(
                        &mut self.buffer.chars[row][col],
                        ScreenChar {
                            ascii_character: byte,
                            color_code: color,
                        },
                    );
                }
                self.col += 1;
                self.update_hardware_cursor();
            }
        }
    }

    fn newline(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                // SAFETY: row in 1..BUFFER_HEIGHT, col in 0..BUFFER_WIDTH.
                let ch = unsafe { core::ptr::read_volatile(&self.buffer.chars[row][col]) };
                unsafe {
                    write_volatile(&mut self.buffer.chars[row - 1][col], ch);
                }
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
        self.col = 0;
        if self.row < BUFFER_HEIGHT - 1 {
            self.row += 1;
        }
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color,
        };
        for col in 0..BUFFER_WIDTH {
            // SAFETY: row < BUFFER_HEIGHT by every caller, col < BUFFER_WIDTH.
            unsafe {
                write_volatile(&mut self.buffer.chars[row][col], blank);
            }
        }
    }

    fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.col = 0;
        self.update_hardware_cursor();
    }

    fn set_cursor(&mut self, row: usize, col: usize) {
        self.row = row.min(BUFFER_HEIGHT - 1);
        self.col = col.min(BUFFER_WIDTH - 1);
        self.update_hardware_cursor();
    }

    fn set_color(&mut self, byte: u8) {
        self.color = ColorCode(byte);
    }

    fn update_hardware_cursor(&self) {
        let pos = (self.row * BUFFER_WIDTH + self.col) as u16;
        unsafe {
            super::outb(VGA_CRTC_INDEX, 0x0F);
            super::outb(VGA_CRTC_DATA, (pos & 0xFF) as u8);
            super::outb(VGA_CRTC_INDEX, 0x0E);
            super::outb(VGA_CRTC_DATA, ((pos >> 8) & 0xFF) as u8);
        }
    }
}

impl fmt::Write for Terminal {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.putchar(byte),
                _ => self.putchar(0xfe),
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref TERMINAL: Mutex<Terminal> = Mutex::new(Terminal {
        row: 0,
        col: 0,
        color: ColorCode(0x0F),
        // SAFETY: VGA_BUFFER_ADDR is the well-known VGA text buffer mapped
        // into kernel space by the boot-mapped low-8-MiB region; `Terminal`
        // is only ever reached through the enclosing `Mutex`.
        buffer: unsafe { &mut *(VGA_BUFFER_ADDR as *mut Buffer) },
    });
}

/// `TerminalWrite`'s single character sink (§4.7/§6.5).
pub fn putchar(byte: u8) {
    TERMINAL.lock().putchar(byte);
}

pub fn clear() {
    TERMINAL.lock().clear();
}

pub fn set_cursor(row: usize, col: usize) {
    TERMINAL.lock().set_cursor(row, col);
}

pub fn set_color(byte: u8) {
    TERMINAL.lock().set_color(byte);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    without_interrupts(|| {
        TERMINAL.lock().write_fmt(args).expect("VGA write_fmt failed");
    });
}

fn without_interrupts<F: FnOnce() -> R, R>(f: F) -> R {
    let was_enabled = super::interrupts_enabled();
    super::disable_interrupts();
    let result = f();
    if was_enabled {
        super::enable_interrupts();
    }
    result
}
