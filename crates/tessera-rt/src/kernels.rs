//! Kernels called from generated code.
//!
//! Every function here uses the C ABI and plain scalar/pointer arguments so
//! that Cranelift signatures can be written against it directly.

use crate::error::RuntimeError;
use crate::registry::RuntimeSymbolRegistry;
use std::alloc;

/// Allocates zeroed storage for a buffer.
///
/// Zero-sized requests return a dangling, aligned pointer, like Rust's own
/// allocator does for ZSTs. Returns null on an invalid layout or when the
/// allocator fails.
///
/// # Safety
/// The returned pointer must be released with [`tessera_buffer_free`] using the
/// same `size` and `align`.
#[no_mangle]
pub unsafe extern "C" fn tessera_buffer_malloc(size: usize, align: usize) -> *mut u8 {
    if size == 0 {
        return align as *mut u8;
    }
    match alloc::Layout::from_size_align(size, align) {
        Ok(layout) => {
            let ptr = alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                log::error!("buffer allocation of {} bytes failed", size);
            }
            ptr
        }
        Err(_) => {
            log::error!("invalid buffer layout: size {} align {}", size, align);
            std::ptr::null_mut()
        }
    }
}

/// Releases storage obtained from [`tessera_buffer_malloc`].
///
/// # Safety
/// `ptr` must come from `tessera_buffer_malloc(size, align)` and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn tessera_buffer_free(ptr: *mut u8, size: usize, align: usize) {
    if size == 0 || ptr.is_null() {
        return;
    }
    if let Ok(layout) = alloc::Layout::from_size_align(size, align) {
        alloc::dealloc(ptr, layout);
    }
}

#[no_mangle]
pub extern "C" fn tessera_expf(x: f32) -> f32 {
    x.exp()
}

#[no_mangle]
pub extern "C" fn tessera_tanhf(x: f32) -> f32 {
    x.tanh()
}

#[no_mangle]
pub extern "C" fn tessera_sigmoidf(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[no_mangle]
pub extern "C" fn tessera_fmaxf(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Name and address of every built-in kernel, in registration order.
pub fn builtin_kernels() -> Vec<(&'static str, *const u8)> {
    vec![
        ("tessera_buffer_malloc", tessera_buffer_malloc as *const u8),
        ("tessera_buffer_free", tessera_buffer_free as *const u8),
        ("tessera_expf", tessera_expf as *const u8),
        ("tessera_tanhf", tessera_tanhf as *const u8),
        ("tessera_sigmoidf", tessera_sigmoidf as *const u8),
        ("tessera_fmaxf", tessera_fmaxf as *const u8),
    ]
}

/// Publishes the built-in kernels in the global registry. Safe to call repeatedly.
pub fn register_builtin_kernels() -> Result<(), RuntimeError> {
    let registry = RuntimeSymbolRegistry::global();
    for (name, ptr) in builtin_kernels() {
        registry.register(name, ptr)?;
    }
    log::debug!("runtime registry holds {} symbols", registry.len());
    Ok(())
}
