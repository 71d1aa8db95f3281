use thiserror::Error;

/// Errors raised while populating the runtime symbol registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("runtime symbol `{0}` is already registered at a different address")]
    DuplicateSymbol(String),

    #[error("runtime symbol `{0}` cannot be bound to a null address")]
    NullAddress(String),

    #[error("runtime symbol name is empty")]
    EmptyName,
}
