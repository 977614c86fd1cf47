//! Per-function IR builder facade for query code generation.
//!
//! `CodeGen` wraps Cranelift's `FunctionBuilder` for the duration of one
//! function definition. Every data-structure generator in this crate emits
//! through it, never through Cranelift directly.
//!
//! # Phi Model
//!
//! Cranelift has no phi instruction; a merge value is a block parameter and
//! each predecessor passes the incoming value as a branch argument. The
//! generators in this crate learn their incoming values late (a loop's exit
//! values are only known after the last `break`), so `CodeGen` records every
//! branch edge as it is emitted and every `(phi, predecessor) -> value`
//! pairing separately. [`CodeGen::finish`] then appends the arguments to each
//! recorded branch in parameter order. A recorded edge into a block with a
//! phi that has no incoming value for that edge is a builder bug and panics.
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Constants | `const_i8`, `const_i16`, `const_i32`, `const_i64`, `const_int`, `const_bool`, `const_f64`, `null_ptr` |
//! | Arithmetic | `add`, `sub`, `mul`, `udiv`, `urem`, `and`, `or`, `xor`, `not`, `shl`, `ushr`, `umin` |
//! | Comparisons | `icmp_eq`, `icmp_ne`, `icmp_slt`, `icmp_ult`, ..., `fcmp_eq`, `fcmp_lt`, `fcmp_gt` |
//! | Conversions | `zext`, `sext`, `trunc`, `bool_to_int`, `bitcast_to_int` |
//! | Memory | `load`, `store`, `load_field`, `store_field`, `ptr_add`, `ptr_add_const`, `stack_buffer` |
//! | Control flow | `create_block`, `switch_to_block`, `current_block`, `br`, `cond_br`, `select`, `ret` |
//! | Phi nodes | `phi`, `add_incoming`, `predecessors` |
//! | Calls | `call_runtime`, `call_runtime_value`, `call_function`, `call_indirect`, `func_addr` |

use cranelift_codegen::ir::{self, Block, Inst, Type};
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITModule;
use cranelift_module::FuncId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::CodegenConfig;

mod arithmetic;
mod calls;
mod constants;
mod control_flow;
mod memory;
mod phi_blocks;

/// IR type of every pointer handed between generated code and the runtime.
pub const PTR: Type = ir::types::I64;

/// Runtime functions declared in the module, by symbol name.
pub(crate) type RuntimeIds = FxHashMap<&'static str, FuncId>;

/// One emitted branch edge, kept until [`CodeGen::finish`] patches phi arguments.
#[derive(Clone, Copy, Debug)]
struct Edge {
    from: Block,
    to: Block,
    inst: Inst,
}

/// Builder facade for one function under construction.
pub struct CodeGen<'a> {
    builder: FunctionBuilder<'a>,
    module: &'a mut JITModule,
    runtime: &'a RuntimeIds,
    config: &'a CodegenConfig,
    /// Functions already imported into this function, by module id.
    func_refs: FxHashMap<FuncId, ir::FuncRef>,
    /// Phis of each block, in block-parameter order.
    phis: FxHashMap<Block, SmallVec<[ir::Value; 4]>>,
    /// `(phi, predecessor) -> incoming value`.
    incoming: FxHashMap<(ir::Value, Block), ir::Value>,
    edges: Vec<Edge>,
}

impl<'a> CodeGen<'a> {
    pub(crate) fn new(
        builder: FunctionBuilder<'a>,
        module: &'a mut JITModule,
        runtime: &'a RuntimeIds,
        config: &'a CodegenConfig,
    ) -> Self {
        Self {
            builder,
            module,
            runtime,
            config,
            func_refs: FxHashMap::default(),
            phis: FxHashMap::default(),
            incoming: FxHashMap::default(),
            edges: Vec::new(),
        }
    }

    /// Configuration of the owning [`CodeContext`](crate::CodeContext).
    #[inline]
    pub fn config(&self) -> &'a CodegenConfig {
        self.config
    }

    /// IR type of a value.
    #[inline]
    pub fn value_type(&self, value: ir::Value) -> Type {
        self.builder.func.dfg.value_type(value)
    }

    /// Give `block` one parameter per function parameter.
    pub(crate) fn append_function_params(&mut self, block: Block) {
        self.builder.append_block_params_for_function_params(block);
    }

    /// Parameters of a block, including phis.
    pub fn block_params(&self, block: Block) -> Vec<ir::Value> {
        self.builder.block_params(block).to_vec()
    }

    /// Complete the function: patch phi arguments, seal and finalize.
    pub(crate) fn finish(mut self) {
        self.patch_phi_edges();
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}
