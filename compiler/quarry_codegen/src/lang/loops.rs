//! Loops with loop-carried variables.

use cranelift_codegen::ir::{self, Block};
use smallvec::SmallVec;

use crate::codegen::CodeGen;

type Values = SmallVec<[ir::Value; 4]>;

/// A while-loop whose carried variables are phis of the body header.
///
/// ```text
/// pre:   cond_br initial_condition, body(init...), exit
/// body:  ...caller code...
///        cond_br continue_condition, body(next...), exit
/// exit:  [final phis, see collect_final_loop_variables]
/// ```
pub struct Loop {
    pre_block: Block,
    body_block: Block,
    exit_block: Block,
    init: Values,
    phis: Values,
    next: Values,
    /// Block holding the back edge, once `loop_end` ran.
    last_loop_block: Option<Block>,
    break_blocks: SmallVec<[Block; 2]>,
}

impl Loop {
    /// Start a loop entered only when `initial_condition` holds.
    ///
    /// Leaves the builder in the body block.
    pub fn new(cg: &mut CodeGen<'_>, initial_condition: ir::Value, loop_vars: &[ir::Value]) -> Self {
        let pre_block = cg.current_block();
        let body_block = cg.create_block();
        let exit_block = cg.create_block();

        let mut phis = Values::new();
        for &init in loop_vars {
            let ty = cg.value_type(init);
            let phi = cg.phi(body_block, ty);
            cg.add_incoming(phi, init, pre_block);
            phis.push(phi);
        }

        cg.cond_br(initial_condition, body_block, exit_block);
        cg.switch_to_block(body_block);

        Loop {
            pre_block,
            body_block,
            exit_block,
            init: loop_vars.iter().copied().collect(),
            phis,
            next: Values::new(),
            last_loop_block: None,
            break_blocks: SmallVec::new(),
        }
    }

    /// Current value of loop variable `index` inside the body.
    pub fn loop_var(&self, index: usize) -> ir::Value {
        self.phis[index]
    }

    pub fn num_loop_vars(&self) -> usize {
        self.phis.len()
    }

    /// Close the body: loop again with `next_values` while
    /// `continue_condition` holds. Leaves the builder in the exit block.
    pub fn loop_end(&mut self, cg: &mut CodeGen<'_>, continue_condition: ir::Value, next_values: &[ir::Value]) {
        assert!(self.last_loop_block.is_none(), "loop_end called twice");
        assert_eq!(
            next_values.len(),
            self.phis.len(),
            "loop_end needs one next value per loop variable"
        );
        let current = cg.current_block();
        for (&phi, &next) in self.phis.iter().zip(next_values) {
            cg.add_incoming(phi, next, current);
        }
        cg.cond_br(continue_condition, self.body_block, self.exit_block);
        self.next = next_values.iter().copied().collect();
        self.last_loop_block = Some(current);
        cg.switch_to_block(self.exit_block);
    }

    /// Leave the loop from the current point.
    ///
    /// Emission continues in a fresh block with no predecessors, so code
    /// after the break site inside the body is dead.
    pub fn break_(&mut self, cg: &mut CodeGen<'_>) {
        let current = cg.current_block();
        cg.br(self.exit_block);
        self.break_blocks.push(current);
        let after = cg.create_block();
        cg.switch_to_block(after);
    }

    /// Value of every loop variable after the loop, merged over all exits.
    ///
    /// The merge sees the initial value when the body never ran, the last
    /// next value on normal exit and the current value at each break site.
    /// Must be called in the exit block.
    pub fn collect_final_loop_variables(&self, cg: &mut CodeGen<'_>) -> Vec<ir::Value> {
        let Some(last_loop_block) = self.last_loop_block else {
            panic!("collect_final_loop_variables requires loop_end");
        };
        debug_assert_eq!(cg.current_block(), self.exit_block);

        let mut finals = Vec::with_capacity(self.phis.len());
        for (i, &phi) in self.phis.iter().enumerate() {
            let ty = cg.value_type(phi);
            let merged = cg.phi(self.exit_block, ty);
            cg.add_incoming(merged, self.init[i], self.pre_block);
            cg.add_incoming(merged, self.next[i], last_loop_block);
            for &break_block in &self.break_blocks {
                cg.add_incoming(merged, phi, break_block);
            }
            finals.push(merged);
        }
        finals
    }

    pub fn body_block(&self) -> Block {
        self.body_block
    }

    pub fn exit_block(&self) -> Block {
        self.exit_block
    }
}

/// Half-open row range `[start, end)` of one batch.
#[derive(Clone, Copy, Debug)]
pub struct Range {
    pub start: ir::Value,
    pub end: ir::Value,
}

/// A loop over `[0, total)` in batches of at most `batch_size`.
///
/// Loop variable 0 is the batch start; caller variables follow it.
pub struct VectorizedLoop {
    inner: Loop,
    total: ir::Value,
    range: Range,
    ended: bool,
}

impl VectorizedLoop {
    /// Start the batch loop. Leaves the builder in the body block with
    /// [`current_range`](Self::current_range) computed.
    pub fn new(cg: &mut CodeGen<'_>, total: ir::Value, batch_size: u32, extra_vars: &[ir::Value]) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        let ty = cg.value_type(total);
        let zero = cg.const_int(ty, 0);
        let has_rows = cg.icmp_ugt(total, zero);

        let mut init = Values::with_capacity(extra_vars.len() + 1);
        init.push(zero);
        init.extend_from_slice(extra_vars);
        let inner = Loop::new(cg, has_rows, &init);

        let start = inner.loop_var(0);
        // Clamp the step to the rows left so the end never wraps past `total`.
        let batch = cg.const_int(ty, i64::from(batch_size));
        let remaining = cg.sub(total, start);
        let step = cg.umin(batch, remaining);
        let end = cg.add(start, step);

        VectorizedLoop {
            inner,
            total,
            range: Range { start, end },
            ended: false,
        }
    }

    pub fn current_range(&self) -> Range {
        self.range
    }

    /// Current value of caller variable `index`.
    pub fn loop_var(&self, index: usize) -> ir::Value {
        self.inner.loop_var(index + 1)
    }

    /// Advance to the next batch while rows remain.
    pub fn loop_end(&mut self, cg: &mut CodeGen<'_>, extra_next: &[ir::Value]) {
        let more = cg.icmp_ult(self.range.end, self.total);
        let mut next = Values::with_capacity(extra_next.len() + 1);
        next.push(self.range.end);
        next.extend_from_slice(extra_next);
        self.inner.loop_end(cg, more, &next);
        self.ended = true;
    }

    /// Final values of the caller variables.
    pub fn collect_final_loop_variables(&self, cg: &mut CodeGen<'_>) -> Vec<ir::Value> {
        let mut finals = self.inner.collect_final_loop_variables(cg);
        finals.remove(0);
        finals
    }
}

impl Drop for VectorizedLoop {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(self.ended, "vectorized loop dropped without loop_end");
        }
    }
}
