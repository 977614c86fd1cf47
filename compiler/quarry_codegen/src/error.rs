//! Code generation errors.
//!
//! Every variant means the query being compiled cannot be compiled. Builder
//! misuse is not reported here; it panics at the call site.

use cranelift_module::ModuleError;

/// Error raised while emitting or finalizing generated code.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The requested combination of operation and input is not supported.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The operation exists but has no implementation for this structure.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Declaring, defining or finalizing a function failed.
    #[error("module error: {0}")]
    Module(#[from] Box<ModuleError>),

    /// The host target could not be configured.
    #[error("target configuration failed: {0}")]
    Isa(String),

    /// Generated code referenced a runtime function nobody declared.
    #[error("runtime function `{0}` is not declared")]
    MissingRuntimeFunction(String),
}

impl From<ModuleError> for CodegenError {
    fn from(err: ModuleError) -> Self {
        CodegenError::Module(Box::new(err))
    }
}

/// Result alias used throughout the code generator.
pub type CodegenResult<T> = Result<T, CodegenError>;
