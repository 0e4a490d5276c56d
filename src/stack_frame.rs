use std::sync::Arc;

use byteorder::{ReadBytesExt, BE};
use kloader::attributes::{Code, ExceptionTableEntry};
use kloader::constants::ConstantPool;

use crate::errors::{internal, VmResult};
use crate::value::Value;

/// How much the operand stack may outgrow the declared max before it
/// counts as an interpreter bug.
const STACK_MARGIN: usize = 4;

/// One stack-machine record bound to one active method call. Frames are
/// thread-local; operand stack and locals are never shared.
pub struct StackFrame {
    pub stack: Vec<Value>,
    pub locals: Vec<Value>,
    pub code: Vec<u8>,
    pub offset: usize,
    pub pool: Arc<Vec<ConstantPool>>,
    pub this_value: Option<Value>,
    pub exception_table: Vec<ExceptionTableEntry>,
}

impl StackFrame {
    /// Builds the frame for one call: slot 0 binds the receiver when
    /// present, parameters follow, and wide values take two slots.
    pub fn new(
        code: &Code,
        pool: Arc<Vec<ConstantPool>>,
        this_value: Option<Value>,
        params: Vec<Value>,
    ) -> StackFrame {
        let mut needed = usize::from(this_value.is_some());
        for param in &params {
            needed += if param.is_wide() { 2 } else { 1 };
        }
        let mut locals = vec![Value::Null; (code.max_locals as usize).max(needed)];
        let mut slot = 0;
        if let Some(this) = &this_value {
            locals[0] = this.clone();
            slot = 1;
        }
        for param in params {
            let wide = param.is_wide();
            locals[slot] = param;
            slot += if wide { 2 } else { 1 };
        }
        StackFrame {
            stack: Vec::with_capacity(code.max_stack as usize + STACK_MARGIN),
            locals,
            code: code.code.clone(),
            offset: 0,
            pool,
            this_value,
            exception_table: code.exception_table.clone(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| internal("operand stack underflow"))
    }

    pub fn local(&self, index: usize) -> VmResult<Value> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| internal(format!("local slot {index} out of range")))
    }

    pub fn set_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        match self.locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(internal(format!("local slot {index} out of range"))),
        }
    }

    fn code_at_offset(&self) -> VmResult<&[u8]> {
        self.code
            .get(self.offset..)
            .ok_or_else(|| internal("code offset ran past the end of the method"))
    }

    pub fn read_u8(&mut self) -> VmResult<u8> {
        let value = self
            .code_at_offset()?
            .read_u8()
            .map_err(|_| internal("code offset ran past the end of the method"))?;
        self.offset += 1;
        Ok(value)
    }

    pub fn read_i8(&mut self) -> VmResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> VmResult<u16> {
        let value = self
            .code_at_offset()?
            .read_u16::<BE>()
            .map_err(|_| internal("code offset ran past the end of the method"))?;
        self.offset += 2;
        Ok(value)
    }

    pub fn read_i16(&mut self) -> VmResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> VmResult<i32> {
        let value = self
            .code_at_offset()?
            .read_i32::<BE>()
            .map_err(|_| internal("code offset ran past the end of the method"))?;
        self.offset += 4;
        Ok(value)
    }

    /// The exception-table entries whose `[start_pc, end_pc)` window
    /// covers `pc`, in declaration order.
    pub fn active_handlers(&self, pc: usize) -> Vec<ExceptionTableEntry> {
        self.exception_table
            .iter()
            .filter(|entry| (entry.start_pc as usize) <= pc && pc < entry.end_pc as usize)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn code_with(max_stack: u16, max_locals: u16) -> Code {
        Code {
            max_stack,
            max_locals,
            code: vec![0xb1],
            exception_table: vec![
                ExceptionTableEntry {
                    start_pc: 0,
                    end_pc: 4,
                    handler_pc: 9,
                    catch_type: 0,
                },
                ExceptionTableEntry {
                    start_pc: 4,
                    end_pc: 8,
                    handler_pc: 9,
                    catch_type: 1,
                },
            ],
            attributes: Vec::new(),
        }
    }

    #[test]
    fn wide_parameters_take_two_slots() {
        let code = code_with(2, 4);
        let frame = StackFrame::new(
            &code,
            Arc::new(vec![ConstantPool::Unknown]),
            None,
            vec![Value::Long(9), Value::Int(3)],
        );
        assert!(matches!(frame.locals[0], Value::Long(9)));
        assert!(matches!(frame.locals[2], Value::Int(3)));
    }

    #[test]
    fn receiver_binds_to_slot_zero() {
        let code = code_with(1, 2);
        let frame = StackFrame::new(
            &code,
            Arc::new(vec![ConstantPool::Unknown]),
            Some(Value::Int(1)),
            vec![Value::Int(2)],
        );
        assert!(matches!(frame.locals[0], Value::Int(1)));
        assert!(matches!(frame.locals[1], Value::Int(2)));
    }

    #[test]
    fn active_handlers_follow_the_pc_window() {
        let code = code_with(1, 1);
        let frame = StackFrame::new(&code, Arc::new(vec![ConstantPool::Unknown]), None, vec![]);
        assert_eq!(frame.active_handlers(0).len(), 1);
        assert_eq!(frame.active_handlers(3).len(), 1);
        assert_eq!(frame.active_handlers(4)[0].catch_type, 1);
        assert!(frame.active_handlers(8).is_empty());
    }
}
