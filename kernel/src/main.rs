//! Bare-metal entry binary. `_start` itself lives in `arch::x86::boot`,
//! `#[no_mangle]`'d so the linker resolves `link.ld`'s `ENTRY(_start)`
//! straight into the library; this crate only needs to exist so that code
//! gets linked in, and to supply the panic handler the library leaves out
//! of non-test builds.

#![no_std]
#![no_main]

use nova_kernel as _;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("{}", info);
    loop {
        core::hint::spin_loop();
    }
}
