use crate::bytecode::{Instruction, InstructionIndex, JumpKind};
use crate::lang::code::CodeObject;
use crate::lang::value::Value;
use std::collections::BTreeSet;

/// Print disassembly of a code object and everything nested in it
pub fn print_code(code: &CodeObject) {
    print!("{}", disassemble(code));
}

/// Disassembly of `code` followed by its nested code objects, depth first.
pub fn disassemble(code: &CodeObject) -> String {
    let mut output = String::new();
    disassemble_into(code, &mut output);
    output
}

fn disassemble_into(code: &CodeObject, output: &mut String) {
    output.push_str("════════════════════════════════════════\n");
    output.push_str(&format!(" {}\n", code.key()));
    output.push_str(&format!(" {} instructions\n", code.instructions.len()));
    output.push_str("════════════════════════════════════════\n");
    output.push_str(&disassemble_to_string(&code.instructions));
    output.push('\n');

    for inst in code.instructions.iter() {
        if let Value::Code(nested) = &inst.argval {
            disassemble_into(nested, output);
        }
    }
}

fn collect_jump_targets(index: &InstructionIndex) -> BTreeSet<usize> {
    index.iter().filter_map(Instruction::jump_target).collect()
}

// =============================================================================
// String output (for testing/logging)
// =============================================================================

/// Return disassembly as a String
pub fn disassemble_to_string(index: &InstructionIndex) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(index);

    for inst in index.iter() {
        let is_target = jump_targets.contains(&inst.offset);
        if is_target {
            output.push_str("           ┌──────────────────────────────────\n");
        }

        match inst.line_start {
            Some(line) => output.push_str(&format!("{:>4} ", line)),
            None => output.push_str("     "),
        }
        output.push_str(&format!("{:>4} ", inst.offset));
        output.push_str(if is_target { "► " } else { "  " });
        output.push_str(&format_inst(inst));
        output.push('\n');
    }

    output
}

fn format_inst(inst: &Instruction) -> String {
    match inst.jump_target() {
        Some(target) => {
            let direction = if target <= inst.offset { "↑" } else { "↓" };
            let mode = if inst.jump == JumpKind::Relative { "rel" } else { "abs" };
            format!("{:<24} {} {} (→ {:04})", inst.opname, mode, direction, target)
        }
        None if inst.argrepr.is_empty() => inst.opname.clone(),
        None => format!("{:<24} {}", inst.opname, inst.argrepr),
    }
}
