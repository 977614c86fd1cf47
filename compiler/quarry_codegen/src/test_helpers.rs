//! JIT helpers for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only JIT harness")]

use cranelift_codegen::ir::{self, Type};

use crate::{CodeContext, CodeGen, CodegenConfig, CodegenResult};

/// A finalized context holding one entry function.
pub struct Jitted {
    // Owns the code behind `ptr`.
    _ctx: CodeContext,
    pub ptr: *const u8,
}

/// Define `body` as `test_fn`, finalize, and return its address.
pub fn jit<F>(params: &[Type], returns: &[Type], body: F) -> Jitted
where
    F: FnOnce(&mut CodeGen<'_>, &[ir::Value]) -> CodegenResult<()>,
{
    jit_with(CodegenConfig::default(), params, returns, body)
}

pub fn jit_with<F>(config: CodegenConfig, params: &[Type], returns: &[Type], body: F) -> Jitted
where
    F: FnOnce(&mut CodeGen<'_>, &[ir::Value]) -> CodegenResult<()>,
{
    crate::init_tracing();
    let mut ctx = CodeContext::new(config).expect("host ISA");
    let id = ctx
        .define_function("test_fn", params, returns, body)
        .expect("function compiles");
    ctx.finalize().expect("finalize");
    let ptr = ctx.function_ptr(id);
    Jitted { _ctx: ctx, ptr }
}

/// Reinterpret a JIT entry address as a typed function pointer.
///
/// # Safety
///
/// `F` must be an `extern "C" fn` type matching the compiled signature.
pub unsafe fn as_fn<F: Copy>(ptr: *const u8) -> F {
    assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const u8>());
    std::mem::transmute_copy(&ptr)
}
