//! Two-armed conditional.

use cranelift_codegen::ir::{self, Block};

use crate::codegen::CodeGen;

/// `if cond { then } else { else }` with an optional merged value.
///
/// Emission starts in the then-arm. [`else_block`](If::else_block) switches
/// to the else-arm; [`end_if`](If::end_if) closes whichever arm is open and
/// continues in the merge block.
pub struct If {
    then_block: Block,
    else_block: Block,
    merge_block: Block,
    in_else: bool,
    /// Block the then-arm ended in, once closed.
    then_end: Option<Block>,
    /// Block the else-arm ended in, once closed.
    else_end: Option<Block>,
    /// The then-arm left to a block other than the merge block.
    then_escaped: bool,
    ended: bool,
}

impl If {
    pub fn new(cg: &mut CodeGen<'_>, cond: ir::Value) -> Self {
        let then_block = cg.create_block();
        let else_block = cg.create_block();
        let merge_block = cg.create_block();
        cg.cond_br(cond, then_block, else_block);
        cg.switch_to_block(then_block);
        If {
            then_block,
            else_block,
            merge_block,
            in_else: false,
            then_end: None,
            else_end: None,
            then_escaped: false,
            ended: false,
        }
    }

    /// Close the then-arm and start emitting the else-arm.
    pub fn else_block(&mut self, cg: &mut CodeGen<'_>) {
        assert!(!self.in_else && !self.ended, "else_block called twice");
        self.then_end = Some(cg.current_block());
        cg.br(self.merge_block);
        cg.switch_to_block(self.else_block);
        self.in_else = true;
    }

    /// Close the open arm and continue in the merge block.
    pub fn end_if(&mut self, cg: &mut CodeGen<'_>) {
        let merge = self.merge_block;
        self.close(cg, merge);
    }

    /// Close the open arm with a branch to `target` instead of the merge block.
    ///
    /// Used when a match inside a loop leaves the loop directly. An else-arm
    /// that was never opened still falls through to the merge block.
    pub fn end_if_to(&mut self, cg: &mut CodeGen<'_>, target: Block) {
        if !self.in_else {
            self.then_escaped = target != self.merge_block;
        }
        self.close(cg, target);
    }

    fn close(&mut self, cg: &mut CodeGen<'_>, target: Block) {
        assert!(!self.ended, "end_if called twice");
        let current = cg.current_block();
        cg.br(target);
        if self.in_else {
            self.else_end = Some(current);
        } else {
            self.then_end = Some(current);
            cg.switch_to_block(self.else_block);
            cg.br(self.merge_block);
            self.else_end = Some(self.else_block);
        }
        cg.switch_to_block(self.merge_block);
        self.ended = true;
    }

    /// Merge a value computed on each arm.
    ///
    /// # Panics
    ///
    /// Panics before `end_if`, or when the then-arm left to another block.
    pub fn build_phi(&self, cg: &mut CodeGen<'_>, then_value: ir::Value, else_value: ir::Value) -> ir::Value {
        assert!(self.ended, "build_phi requires end_if");
        assert!(!self.then_escaped, "build_phi after the then-arm escaped the merge block");
        let (Some(then_end), Some(else_end)) = (self.then_end, self.else_end) else {
            panic!("both arms must be closed before build_phi");
        };
        let ty = cg.value_type(then_value);
        let phi = cg.phi(self.merge_block, ty);
        cg.add_incoming(phi, then_value, then_end);
        cg.add_incoming(phi, else_value, else_end);
        phi
    }

    /// The block the then-arm starts in.
    pub fn then_block(&self) -> Block {
        self.then_block
    }

    pub fn merge_block(&self) -> Block {
        self.merge_block
    }
}
