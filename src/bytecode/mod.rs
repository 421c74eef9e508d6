pub mod disasm;
pub mod instruction;

pub use instruction::{Instruction, InstructionIndex, JumpKind};