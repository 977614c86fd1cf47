//! Phi nodes and edge bookkeeping for `CodeGen`.

use cranelift_codegen::ir::{self, Block, Inst, Type};
use smallvec::SmallVec;

use super::{CodeGen, Edge};

impl CodeGen<'_> {
    /// Add a phi of type `ty` to `block`.
    ///
    /// Incoming values are supplied with [`add_incoming`](Self::add_incoming),
    /// before or after the branches into `block` are emitted.
    pub fn phi(&mut self, block: Block, ty: Type) -> ir::Value {
        // Goes through the DFG: the block may already hold instructions.
        let param = self.builder.func.dfg.append_block_param(block, ty);
        self.phis.entry(block).or_default().push(param);
        param
    }

    /// Value `phi` takes when control arrives from `from`.
    pub fn add_incoming(&mut self, phi: ir::Value, value: ir::Value, from: Block) {
        debug_assert_eq!(
            self.value_type(phi),
            self.value_type(value),
            "phi incoming value type mismatch"
        );
        self.incoming.insert((phi, from), value);
    }

    /// Blocks that branch to `block`, in emission order.
    pub fn predecessors(&self, block: Block) -> SmallVec<[Block; 4]> {
        let mut preds: SmallVec<[Block; 4]> = SmallVec::new();
        for edge in self.edges.iter().filter(|e| e.to == block) {
            if !preds.contains(&edge.from) {
                preds.push(edge.from);
            }
        }
        preds
    }

    pub(super) fn record_edge(&mut self, from: Block, to: Block, inst: Inst) {
        self.edges.push(Edge { from, to, inst });
    }

    /// Append phi arguments to every recorded branch into a block with phis.
    pub(super) fn patch_phi_edges(&mut self) {
        let func = &mut *self.builder.func;
        for edge in &self.edges {
            let Some(phis) = self.phis.get(&edge.to) else {
                continue;
            };
            for &phi in phis {
                let Some(&value) = self.incoming.get(&(phi, edge.from)) else {
                    panic!(
                        "phi {phi} of {} has no incoming value from predecessor {}",
                        edge.to, edge.from
                    );
                };
                let dfg = &mut func.dfg;
                for call in dfg.insts[edge.inst].branch_destination_mut(&mut dfg.jump_tables) {
                    if call.block(&dfg.value_lists) == edge.to {
                        call.append_argument(value, &mut dfg.value_lists);
                    }
                }
            }
        }
    }
}
