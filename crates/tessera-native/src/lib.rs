//! Cranelift JIT back end for Tessera.
//!
//! [`ExecutionEngine`] takes finished `tessera-ir` modules, lowers them to
//! Cranelift IR, verifies and optimizes them, and commits them to a
//! compilation session. Callers look symbols up by name and call the
//! returned addresses directly.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod optimizer;
pub mod resolver;
pub mod runtime_support;
pub mod session;
pub mod translator;
pub mod unit;
pub mod verify;

// --- Exports ---
pub use cache::{CompiledObject, ObjectCache};
pub use config::{ConfigError, EngineOptions, OptLevel, Pass};
pub use engine::{EngineStats, ExecutionEngine};
pub use error::{
    CodegenError, CommitError, EngineError, LinkError, NativeError, RuntimeSupportError, VerifyError,
};
pub use host::{initialize, HostTarget};
pub use optimizer::ModuleOptimizer;
pub use resolver::{ProcessSymbols, ResolverChain, SymbolNamespace, SymbolResolver, MAIN_NAMESPACE};
pub use translator::{CodeGen, Lowering};
pub use unit::{DeclId, DeclKind, NativeContext, NativeModule, NativeUnit};
