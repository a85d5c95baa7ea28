//! PS/2 keyboard driver: IRQ1 entry, scancode decoding via `pc-keyboard`,
//! and the `read(buf, n) -> n` interface `TerminalRead` consumes. `read`
//! may return 0 when no input is pending; the syscall dispatcher turns
//! that into a restart rather than EOF.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

use super::pic::{self, Irq};

const RING_CAPACITY: usize = 256;

struct InputRing {
    buf: [u8; RING_CAPACITY],
    head: usize,
    len: usize,
}

impl InputRing {
    const fn new() -> Self {
        Self {
            buf: [0; RING_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len == RING_CAPACITY {
            return; // drop on overflow; no flow control to the PS/2 device
        }
        let tail = (self.head + self.len) % RING_CAPACITY;
        self.buf[tail] = byte;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(byte)
    }
}

static INPUT: Mutex<InputRing> = Mutex::new(InputRing::new());

lazy_static! {
    static ref KEYBOARD: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(
            ScancodeSet1::new(),
            layouts::Us104Key,
            HandleControl::Ignore,
        )
    );
}

/// Naked IRQ1 entry stub: builds no TrapFrame of its own (keyboard input
/// never causes a reschedule -- it only feeds the ring buffer that a
/// blocked `TerminalRead` syscall restart will drain on its next retry).
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn irq1_entry() -> ! {
    core::arch::naked_asm!(
        "pusha",
        "call {handler}",
        "popa",
        "iretd",
        handler = sym on_irq1,
    )
}

extern "C" fn on_irq1() {
    let scancode: u8 = unsafe { super::inb(0x60) };
    let mut kb = KEYBOARD.lock();
    if let Ok(Some(event)) = kb.add_byte(scancode) {
        if let Some(key) = kb.process_keyevent(event) {
            if let DecodedKey::Unicode(c) = key {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    INPUT.lock().push(byte);
                }
            }
        }
    }
    pic::end_of_interrupt(Irq::Keyboard);
}

/// `TerminalRead`'s `read(buf, n) -> n`: returns however many decoded bytes
/// are immediately available, up to `n`, or 0 if none are pending.
pub fn read(buf: &mut [u8]) -> usize {
    let mut ring = INPUT.lock();
    let mut n = 0;
    while n < buf.len() {
        match ring.pop() {
            Some(byte) => {
                buf[n] = byte;
                n += 1;
            }
            None => break,
        }
    }
    n
}
