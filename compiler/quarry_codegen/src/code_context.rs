//! JIT module ownership and function definition.
//!
//! A `CodeContext` is one compiled query: it owns the `JITModule`, declares
//! every runtime entry point as an import, and turns closures over
//! [`CodeGen`] into defined functions. Call [`finalize`](CodeContext::finalize)
//! once every function is defined, then fetch entry addresses with
//! [`function_ptr`](CodeContext::function_ptr).

use cranelift_codegen::ir::{AbiParam, Type, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};

use crate::codegen::{CodeGen, RuntimeIds};
use crate::config::CodegenConfig;
use crate::error::{CodegenError, CodegenResult};
use crate::proxy::{runtime_symbols, RUNTIME_FUNCTIONS};

pub struct CodeContext {
    module: JITModule,
    runtime: RuntimeIds,
    config: CodegenConfig,
    ctx: Context,
    builder_ctx: FunctionBuilderContext,
    finalized: bool,
}

fn isa_error(err: impl std::fmt::Display) -> CodegenError {
    CodegenError::Isa(err.to_string())
}

impl CodeContext {
    /// Create a context targeting the host machine.
    pub fn new(config: CodegenConfig) -> CodegenResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(isa_error)?;
        flag_builder.set("is_pic", "false").map_err(isa_error)?;
        flag_builder.set("opt_level", "speed").map_err(isa_error)?;

        let isa_builder = cranelift_native::builder().map_err(isa_error)?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(isa_error)?;

        let mut jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
        jit_builder.symbols(runtime_symbols());
        let mut module = JITModule::new(jit_builder);

        let mut runtime = RuntimeIds::default();
        for decl in RUNTIME_FUNCTIONS {
            let mut sig = module.make_signature();
            sig.params.extend(decl.params.iter().map(|&ty| AbiParam::new(ty)));
            sig.returns.extend(decl.returns.iter().map(|&ty| AbiParam::new(ty)));
            let id = module.declare_function(decl.name, Linkage::Import, &sig)?;
            runtime.insert(decl.name, id);
        }
        tracing::debug!(runtime_functions = runtime.len(), "created code context");

        let ctx = module.make_context();
        Ok(Self {
            module,
            runtime,
            config,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
            finalized: false,
        })
    }

    pub fn config(&self) -> &CodegenConfig {
        &self.config
    }

    /// Declare a function so it can be referenced before it is defined.
    pub fn declare_function(&mut self, name: &str, params: &[Type], returns: &[Type]) -> CodegenResult<FuncId> {
        let mut sig = self.module.make_signature();
        sig.params.extend(params.iter().map(|&ty| AbiParam::new(ty)));
        sig.returns.extend(returns.iter().map(|&ty| AbiParam::new(ty)));
        Ok(self.module.declare_function(name, Linkage::Export, &sig)?)
    }

    /// Define `name` with the given signature.
    ///
    /// `body` receives the builder positioned in the entry block and the
    /// function's parameters. It must terminate every block it creates,
    /// including emitting the final `ret`.
    pub fn define_function<F>(
        &mut self,
        name: &str,
        params: &[Type],
        returns: &[Type],
        body: F,
    ) -> CodegenResult<FuncId>
    where
        F: FnOnce(&mut CodeGen<'_>, &[cranelift_codegen::ir::Value]) -> CodegenResult<()>,
    {
        assert!(!self.finalized, "cannot define `{name}` after finalize");
        let id = self.declare_function(name, params, returns)?;

        self.module.clear_context(&mut self.ctx);
        self.ctx.func.signature.params = params.iter().map(|&ty| AbiParam::new(ty)).collect();
        self.ctx.func.signature.returns = returns.iter().map(|&ty| AbiParam::new(ty)).collect();
        self.ctx.func.name = UserFuncName::user(0, id.as_u32());

        let built = {
            let builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let mut cg = CodeGen::new(builder, &mut self.module, &self.runtime, &self.config);
            let entry = cg.create_block();
            cg.append_function_params(entry);
            cg.switch_to_block(entry);
            let args = cg.block_params(entry);
            match body(&mut cg, &args) {
                Ok(()) => {
                    cg.finish();
                    Ok(())
                }
                Err(err) => Err(err),
            }
        };
        if let Err(err) = built {
            // The abandoned builder left its state behind.
            self.builder_ctx = FunctionBuilderContext::new();
            self.module.clear_context(&mut self.ctx);
            return Err(err);
        }

        if self.config.debug_ir {
            eprintln!("{}", self.ctx.func.display());
        }
        tracing::debug!(name, "defining function");

        let defined = self.module.define_function(id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        defined?;
        Ok(id)
    }

    /// Make every defined function executable.
    pub fn finalize(&mut self) -> CodegenResult<()> {
        self.module.finalize_definitions()?;
        self.finalized = true;
        Ok(())
    }

    /// Entry address of a defined function.
    ///
    /// # Panics
    ///
    /// Panics if called before [`finalize`](Self::finalize).
    pub fn function_ptr(&self, id: FuncId) -> *const u8 {
        assert!(self.finalized, "function_ptr requires a finalized context");
        self.module.get_finalized_function(id)
    }
}
