//! Calls into the runtime and between generated functions.

use cranelift_codegen::ir::{self, AbiParam, InstBuilder, Type};
use cranelift_module::{FuncId, Module};
use smallvec::SmallVec;

use super::{CodeGen, PTR};
use crate::error::{CodegenError, CodegenResult};

/// Results of one call. Runtime functions return at most one value.
pub type CallResults = SmallVec<[ir::Value; 2]>;

impl CodeGen<'_> {
    /// Import `id` into the current function, once.
    fn func_ref(&mut self, id: FuncId) -> ir::FuncRef {
        if let Some(&fref) = self.func_refs.get(&id) {
            return fref;
        }
        let fref = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(id, fref);
        fref
    }

    fn runtime_id(&self, name: &str) -> CodegenResult<FuncId> {
        self.runtime
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::MissingRuntimeFunction(name.to_owned()))
    }

    /// Call a runtime function by symbol name.
    pub fn call_runtime(&mut self, name: &str, args: &[ir::Value]) -> CodegenResult<CallResults> {
        let id = self.runtime_id(name)?;
        Ok(self.call_function(id, args))
    }

    /// Call a runtime function that returns exactly one value.
    pub fn call_runtime_value(&mut self, name: &str, args: &[ir::Value]) -> CodegenResult<ir::Value> {
        let results = self.call_runtime(name, args)?;
        match results.first() {
            Some(&value) => Ok(value),
            None => panic!("runtime function `{name}` returns no value"),
        }
    }

    /// Direct call to a function declared in the module.
    pub fn call_function(&mut self, id: FuncId, args: &[ir::Value]) -> CallResults {
        let fref = self.func_ref(id);
        let call = self.builder.ins().call(fref, args);
        self.builder.inst_results(call).iter().copied().collect()
    }

    /// Address of a module function, for passing as a callback.
    pub fn func_addr(&mut self, id: FuncId) -> ir::Value {
        let fref = self.func_ref(id);
        self.builder.ins().func_addr(PTR, fref)
    }

    /// Call through a function pointer with the given signature.
    pub fn call_indirect(
        &mut self,
        params: &[Type],
        returns: &[Type],
        callee: ir::Value,
        args: &[ir::Value],
    ) -> CallResults {
        let mut sig = self.module.make_signature();
        sig.params.extend(params.iter().map(|&ty| AbiParam::new(ty)));
        sig.returns.extend(returns.iter().map(|&ty| AbiParam::new(ty)));
        let sig_ref = self.builder.import_signature(sig);
        let call = self.builder.ins().call_indirect(sig_ref, callee, args);
        self.builder.inst_results(call).iter().copied().collect()
    }

    /// Hint the CPU to pull the cache line at `addr`.
    pub fn prefetch(&mut self, addr: ir::Value) -> CodegenResult<()> {
        self.call_runtime("quarry_prefetch", &[addr])?;
        Ok(())
    }
}
