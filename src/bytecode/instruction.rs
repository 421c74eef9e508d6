use crate::lang::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an instruction's operand addresses a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JumpKind {
    /// Operand is an absolute offset.
    Absolute,
    /// Operand is relative to the next instruction; `argval` is already resolved.
    Relative,
    #[default]
    None,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub offset: usize,
    pub opname: String,
    /// Decoded operand; the resolved target offset for jumps.
    pub argval: Value,
    /// Printable operand.
    pub argrepr: String,
    pub jump: JumpKind,
    pub line_start: Option<u32>,
}

impl Instruction {
    pub fn new(offset: usize, opname: impl Into<String>) -> Self {
        Self {
            offset,
            opname: opname.into(),
            argval: Value::None,
            argrepr: String::new(),
            jump: JumpKind::None,
            line_start: None,
        }
    }

    pub fn jump_abs(offset: usize, opname: impl Into<String>, target: usize) -> Self {
        Self {
            argval: Value::Int(target as i64),
            argrepr: format!("to {}", target),
            jump: JumpKind::Absolute,
            ..Self::new(offset, opname)
        }
    }

    pub fn jump_rel(offset: usize, opname: impl Into<String>, target: usize) -> Self {
        Self {
            jump: JumpKind::Relative,
            ..Self::jump_abs(offset, opname, target)
        }
    }

    pub fn with_arg(mut self, argval: Value) -> Self {
        self.argrepr = argval.repr();
        self.argval = argval;
        self
    }

    pub fn is_jump(&self) -> bool {
        self.jump != JumpKind::None
    }

    pub fn jump_target(&self) -> Option<usize> {
        if self.is_jump() {
            self.argval.as_offset()
        } else {
            None
        }
    }

    /// Jumps taken regardless of the stack top.
    pub fn is_unconditional_jump(&self) -> bool {
        self.is_jump()
            && matches!(
                self.opname.as_str(),
                "JUMP_ABSOLUTE" | "JUMP_FORWARD" | "JUMP_BACKWARD" | "JUMP_BACK" | "JUMP_LOOP"
            )
    }
}

/// Instructions of one code object, ordered by offset, plus the
/// offset-to-position map. Offsets are not contiguous.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Instruction>", into = "Vec<Instruction>")]
pub struct InstructionIndex {
    insts: Vec<Instruction>,
    offset2index: HashMap<usize, usize>,
}

impl From<Vec<Instruction>> for InstructionIndex {
    fn from(insts: Vec<Instruction>) -> Self {
        Self::new(insts)
    }
}

impl From<InstructionIndex> for Vec<Instruction> {
    fn from(index: InstructionIndex) -> Self {
        index.insts
    }
}

impl InstructionIndex {
    pub fn new(insts: Vec<Instruction>) -> Self {
        let offset2index = insts
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.offset, i))
            .collect();
        Self { insts, offset2index }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.insts.get(index)
    }

    /// Position of the instruction starting at `offset`.
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        self.offset2index.get(&offset).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.insts.iter()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.insts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstructionIndex {
        InstructionIndex::new(vec![
            Instruction::new(0, "LOAD_NAME").with_arg(Value::Str("a".into())),
            Instruction::jump_abs(2, "POP_JUMP_IF_FALSE", 10),
            Instruction::new(4, "LOAD_NAME"),
            Instruction::jump_rel(6, "JUMP_FORWARD", 12),
            Instruction::new(10, "LOAD_CONST"),
            Instruction::new(12, "RETURN_VALUE"),
        ])
    }

    #[test]
    fn test_offset_map() {
        let index = sample();
        assert_eq!(index.index_of(10), Some(4));
        assert_eq!(index.index_of(8), None);
        let found = index.index_of(6).and_then(|i| index.get(i));
        assert_eq!(found.map(|i| i.opname.as_str()), Some("JUMP_FORWARD"));
    }

    #[test]
    fn test_jump_queries() {
        let index = sample();
        let cond = index.get(1).unwrap();
        assert_eq!(cond.jump_target(), Some(10));
        assert!(!cond.is_unconditional_jump());
        let fwd = index.get(3).unwrap();
        assert!(fwd.is_unconditional_jump());
        assert_eq!(index.get(0).unwrap().jump_target(), None);
    }

    #[test]
    fn test_serde_rebuilds_offset_map() {
        let index = sample();
        let bytes = postcard::to_allocvec(&index).unwrap();
        let back: InstructionIndex = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back.index_of(12), Some(5));
        assert_eq!(back, index);
    }
}