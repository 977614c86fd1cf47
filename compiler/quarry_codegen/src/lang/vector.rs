//! Selection vectors.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::I32;

use crate::codegen::{CodeGen, PTR};

const ELEMENT_SIZE: i64 = 4;

/// A fixed-capacity array of `i32` row positions in the stack frame.
///
/// The element count is an IR value tracked by the caller through
/// [`set_num_elements`](Vector::set_num_elements).
pub struct Vector {
    buffer: ir::Value,
    capacity: u32,
    num_elements: Option<ir::Value>,
}

impl Vector {
    pub fn new(cg: &mut CodeGen<'_>, capacity: u32) -> Self {
        assert!(capacity > 0, "selection vector capacity must be positive");
        let buffer = cg.stack_buffer(capacity * ELEMENT_SIZE as u32, ELEMENT_SIZE as u32);
        Vector {
            buffer,
            capacity,
            num_elements: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Address of the first element.
    pub fn buffer(&self) -> ir::Value {
        self.buffer
    }

    fn element_addr(&self, cg: &mut CodeGen<'_>, index: ir::Value) -> ir::Value {
        let index = cg.resize_unsigned(index, PTR);
        let offset = cg.mul_const(index, ELEMENT_SIZE);
        cg.ptr_add(self.buffer, offset)
    }

    /// Store `value` (truncated or widened to `i32`) at `index`.
    pub fn set_value(&self, cg: &mut CodeGen<'_>, index: ir::Value, value: ir::Value) {
        let addr = self.element_addr(cg, index);
        let value = cg.resize_unsigned(value, I32);
        cg.store(value, addr, 0);
    }

    pub fn get_value(&self, cg: &mut CodeGen<'_>, index: ir::Value) -> ir::Value {
        let addr = self.element_addr(cg, index);
        cg.load(I32, addr, 0)
    }

    pub fn set_num_elements(&mut self, num_elements: ir::Value) {
        self.num_elements = Some(num_elements);
    }

    /// # Panics
    ///
    /// Panics if no element count has been set.
    pub fn num_elements(&self) -> ir::Value {
        match self.num_elements {
            Some(n) => n,
            None => panic!("selection vector has no element count"),
        }
    }
}
