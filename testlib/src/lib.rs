//! Fixture library for the bridge.
//!
//! Every export is pure. The two adders share one body and differ only in
//! calling convention, so a caller can check that convention-specific
//! invocation works.
#![allow(non_snake_case)]

use std::ffi::c_void;

pub type BOOL = i32;
pub const TRUE: BOOL = 1;

pub const DLL_PROCESS_DETACH: u32 = 0;
pub const DLL_PROCESS_ATTACH: u32 = 1;
pub const DLL_THREAD_ATTACH: u32 = 2;
pub const DLL_THREAD_DETACH: u32 = 3;

/// Returns a fixed value.
#[no_mangle]
pub extern "C" fn helloworld() -> i32 {
    42
}

/// Adds two integers with the default C convention. Overflow wraps.
#[no_mangle]
pub extern "C" fn AddNumbers(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

/// Same as [`AddNumbers`], exported as stdcall on 32-bit Windows.
/// `extern "system"` is the C convention on every other target.
#[no_mangle]
pub extern "system" fn ComputeSumStdCall(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

/// Loader callback. Does nothing for any reason code and never refuses the load.
///
/// Only Windows looks for this symbol, so it is only exported there.
#[cfg_attr(windows, no_mangle)]
pub extern "system" fn DllMain(
    _instance: *mut c_void,
    _reason: u32,
    _reserved: *mut c_void,
) -> BOOL {
    TRUE
}
