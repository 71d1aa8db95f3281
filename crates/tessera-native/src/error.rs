use cranelift_codegen::settings::SetError;
use miette::Diagnostic;
use tessera_ir::ScalarType;
use thiserror::Error;

/// Errors raised by Cranelift while building the ISA, compiling or linking native code.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftGen(#[from] cranelift_codegen::CodegenError),

    #[error("Failed during module processing: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Unsupported host architecture or features: {0}")]
    UnsupportedHost(String),

    #[error("Failed to configure Cranelift settings: {0}")]
    SettingsError(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetupError(String),

    #[error("Function definition failed in module: {0}")]
    CompilationError(String),

    #[error("Symbol `{symbol}` referenced by unit `{unit}` cannot be resolved")]
    UnresolvedSymbol { symbol: String, unit: String },

    #[error("Unit `{0}` failed to materialize earlier: {1}")]
    PoisonedUnit(String, String),
}

/// Errors raised while lowering an intermediate module into Cranelift IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Unknown buffer `{buffer}` in function `{function}`")]
    UnknownBuffer { function: String, buffer: String },

    #[error("Unknown variable `{var}` in function `{function}`")]
    UnknownVariable { function: String, var: String },

    #[error("Type mismatch in `{function}`: expected {expected}, found {found}")]
    TypeMismatch { function: String, expected: ScalarType, found: ScalarType },

    #[error("Index into `{buffer}` in function `{function}` is {found}, expected an integer")]
    NonIntegerIndex { function: String, buffer: String, found: ScalarType },

    #[error("Function `{0}` returns a value but its body can fall off the end")]
    MissingReturn(String),

    #[error("Function `{0}` has no return type but returns a value")]
    UnexpectedReturn(String),

    #[error("Symbol `{0}` is already defined in this module")]
    DuplicateDeclaration(String),

    #[error("Symbol `{0}` is used with conflicting signatures")]
    SignatureMismatch(String),

    #[error("Runtime support helper `{0}` is missing from the unit")]
    MissingRuntimeSupport(String),

    #[error("Buffer `{0}` is too large to allocate")]
    BufferTooLarge(String),
}

/// Failure to load the built-in runtime support text into a unit.
#[derive(Error, Debug)]
pub enum RuntimeSupportError {
    #[error("parse error: {0}")]
    Parse(#[from] cranelift_reader::ParseError),

    #[error(transparent)]
    Declare(#[from] CodegenError),
}

/// Structural or Cranelift verifier failure on a native unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Function `{name}` failed verification:\n{report}")]
    Function { name: String, report: String },

    #[error("Function `{function}` references declaration #{index}, which does not exist")]
    DanglingReference { function: String, index: u32 },

    #[error("Function `{function}` calls `{callee}` with a signature that differs from its declaration")]
    CallSignature { function: String, callee: String },

    #[error("`{0}` is declared as defined in this unit but has no body")]
    MissingDefinition(String),
}

/// Reasons a session refuses to take ownership of a unit.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Symbol `{symbol}` is already defined by unit `{owner}`")]
    DuplicateSymbol { symbol: String, owner: String },

    #[error("Symbol `{0}` clashes with an absolute runtime symbol")]
    AbsoluteSymbolClash(String),

    #[error("Symbol `{0}` is already declared with a different signature")]
    IncompatibleSignature(String),

    #[error(transparent)]
    Module(#[from] cranelift_module::ModuleError),
}

/// Failure of a single `link` request.
#[derive(Error, Debug, Diagnostic)]
pub enum LinkError {
    #[error("Runtime support text failed to load: {0}")]
    #[diagnostic(
        code("LINK-001"),
        help("The built-in runtime support text is part of the engine; this is an engine bug")
    )]
    RuntimeSupport(#[from] RuntimeSupportError),

    #[error("Lowering module `{module}` failed: {source}")]
    #[diagnostic(
        code("LINK-002"),
        help("The intermediate module references something it never declared")
    )]
    Codegen {
        module: String,
        #[source]
        source: CodegenError,
    },

    #[error("Module `{module}` produced invalid native IR ({stage}): {source}")]
    #[diagnostic(code("LINK-003"), help("Run with RUST_LOG=debug to dump the generated IR"))]
    Verify {
        module: String,
        stage: &'static str,
        #[source]
        source: VerifyError,
    },

    #[error("Session rejected module `{module}`: {source}")]
    #[diagnostic(
        code("LINK-004"),
        help("Rename the conflicting function or link it into a separate engine")
    )]
    Commit {
        module: String,
        #[source]
        source: CommitError,
    },
}

impl LinkError {
    /// Commit failures are expected runtime conditions; everything else is a compiler defect.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LinkError::Commit { .. })
    }
}

/// Failure to bring up an engine.
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Native target initialization failed: {0}")]
    #[diagnostic(code("ENGINE-001"), help("Cranelift must support the host and it must be 64-bit"))]
    Host(String),

    #[error("Failed to construct the compilation session: {0}")]
    #[diagnostic(code("ENGINE-002"))]
    Session(#[from] NativeError),

    #[error("Runtime symbol `{0}` could not be bound")]
    #[diagnostic(code("ENGINE-003"), help("Runtime symbol names must be unique"))]
    Binding(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),
}
