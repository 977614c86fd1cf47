//! Shared helpers for JIT end-to-end tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use cranelift_codegen::ir::{self, Type};
use cranelift_module::FuncId;
use quarry_codegen::{CodeContext, CodeGen, CodegenConfig, CodegenResult};

/// A context collecting several functions of one query.
pub struct Program {
    ctx: CodeContext,
}

impl Program {
    pub fn new(config: CodegenConfig) -> Self {
        quarry_codegen::init_tracing();
        Program {
            ctx: CodeContext::new(config).expect("host ISA"),
        }
    }

    pub fn ctx(&mut self) -> &mut CodeContext {
        &mut self.ctx
    }

    pub fn define<F>(&mut self, name: &str, params: &[Type], returns: &[Type], body: F) -> FuncId
    where
        F: FnOnce(&mut CodeGen<'_>, &[ir::Value]) -> CodegenResult<()>,
    {
        self.ctx
            .define_function(name, params, returns, body)
            .unwrap_or_else(|err| panic!("`{name}` failed to compile: {err}"))
    }

    pub fn finish(mut self) -> Compiled {
        self.ctx.finalize().expect("finalize");
        Compiled { ctx: self.ctx }
    }
}

pub struct Compiled {
    ctx: CodeContext,
}

impl Compiled {
    /// Typed entry point of `id`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C" fn` type matching the function's signature.
    pub unsafe fn get<F: Copy>(&self, id: FuncId) -> F {
        let ptr = self.ctx.function_ptr(id);
        assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const u8>());
        std::mem::transmute_copy(&ptr)
    }
}

/// An all-zero runtime struct, ready for its `init` call.
pub fn zeroed<T>() -> T {
    // SAFETY: only used for runtime structs of integers and raw pointers
    unsafe { std::mem::zeroed() }
}

/// Add `amount` to the `i64` at `slot + offset`.
pub fn bump(cg: &mut CodeGen<'_>, slot: ir::Value, offset: i32, amount: ir::Value) {
    let old = cg.load(ir::types::I64, slot, offset);
    let new = cg.add(old, amount);
    cg.store(new, slot, offset);
}
