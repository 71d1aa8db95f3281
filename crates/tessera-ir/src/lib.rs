//! Lowered intermediate representation consumed by the Tessera back end.
//!
//! A [`Module`] is what the graph-level compiler hands to the native backend
//! once scheduling is done: an ordered list of buffer declarations and an
//! ordered list of loop-nest functions over those buffers. Nothing in here
//! knows about machine code; `tessera-native` lowers it to Cranelift IR.

mod builder;
pub mod ir;
mod types;

pub use builder::{BuildError, FunctionBuilder, ModuleBuilder};
pub use ir::{BinaryOp, Buffer, CmpOp, Expr, Function, Module, Param, ParamKind, Stmt};
pub use types::ScalarType;

/// Alignment, in bytes, of every buffer allocated by a generated constructor.
pub const BUFFER_ALIGNMENT: usize = 64;
