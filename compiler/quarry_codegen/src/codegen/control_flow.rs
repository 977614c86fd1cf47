//! Blocks, branches, select and return for `CodeGen`.

use cranelift_codegen::ir::{self, Block, InstBuilder};

use super::CodeGen;

impl CodeGen<'_> {
    pub fn create_block(&mut self) -> Block {
        self.builder.create_block()
    }

    /// Continue emitting into `block`. The previous block must be terminated.
    pub fn switch_to_block(&mut self, block: Block) {
        self.builder.switch_to_block(block);
    }

    /// The block instructions are currently appended to.
    ///
    /// # Panics
    ///
    /// Panics if no block has been selected yet.
    pub fn current_block(&self) -> Block {
        match self.builder.current_block() {
            Some(block) => block,
            None => panic!("no current block: switch to a block before emitting code"),
        }
    }

    /// Unconditional branch.
    pub fn br(&mut self, dest: Block) {
        let from = self.current_block();
        let inst = self.builder.ins().jump(dest, &[]);
        self.record_edge(from, dest, inst);
    }

    /// Two-way branch on a non-zero `cond`.
    pub fn cond_br(&mut self, cond: ir::Value, then_block: Block, else_block: Block) {
        let from = self.current_block();
        let inst = self.builder.ins().brif(cond, then_block, &[], else_block, &[]);
        self.record_edge(from, then_block, inst);
        if else_block != then_block {
            self.record_edge(from, else_block, inst);
        }
    }

    /// `cond ? if_true : if_false` without branching.
    pub fn select(&mut self, cond: ir::Value, if_true: ir::Value, if_false: ir::Value) -> ir::Value {
        self.builder.ins().select(cond, if_true, if_false)
    }

    pub fn ret(&mut self, values: &[ir::Value]) {
        self.builder.ins().return_(values);
    }
}
