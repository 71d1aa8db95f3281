//! Runtime support for code emitted by the Tessera native backend.
//!
//! Generated code cannot link against Rust functions by itself. Every kernel
//! it may call is published in the [`RuntimeSymbolRegistry`] before an
//! execution engine is created; the engine binds each entry as an absolute
//! symbol of its compilation session.

pub mod error;
pub mod kernels;
pub mod registry;

pub use error::RuntimeError;
pub use kernels::register_builtin_kernels;
pub use registry::{RuntimeSymbol, RuntimeSymbolRegistry};
