use crate::opcode::Opcode;
use crate::operations::*;

/// Selects the correct Operation for a given Opcode.
///
/// The family nibble picks an Operation directly, except for families 0x0, 0x8 and 0xE
/// (routed again by their last nibble) and 0xF (routed again by its last byte).
/// Anything left unmatched falls through to `nop`.
pub fn from_op(op: &dyn Opcode) -> Operation {
    match op.nibbles() {
        (0x0, ..) => from_system_op(op),
        (0x1, ..) => jump,
        (0x2, ..) => call,
        (0x3, ..) => ske,
        (0x4, ..) => skne,
        (0x5, ..) => skre,
        (0x6, ..) => load,
        (0x7, ..) => add,
        (0x8, ..) => from_alu_op(op),
        (0x9, ..) => skrne,
        (0xA, ..) => loadi,
        (0xB, ..) => jumpi,
        (0xC, ..) => rand,
        (0xD, ..) => draw,
        (0xE, ..) => from_key_op(op),
        (0xF, ..) => from_misc_op(op),
        _ => nop,
    }
}

/// `0x0__n`
fn from_system_op(op: &dyn Opcode) -> Operation {
    match op.n() {
        0x0 => clr,
        0xE => rts,
        _ => nop,
    }
}

/// `0x8__n`
fn from_alu_op(op: &dyn Opcode) -> Operation {
    match op.n() {
        0x0 => mv,
        0x1 => or,
        0x2 => and,
        0x3 => xor,
        0x4 => addr,
        0x5 => sub,
        0x6 => shr,
        0x7 => subn,
        0xE => shl,
        _ => nop,
    }
}

/// `0xE__n`
fn from_key_op(op: &dyn Opcode) -> Operation {
    match op.n() {
        0xE => skpr,
        0x1 => skup,
        _ => nop,
    }
}

/// `0xF_kk`
fn from_misc_op(op: &dyn Opcode) -> Operation {
    match op.kk() {
        0x07 => moved,
        0x0A => keyd,
        0x15 => loads,
        0x18 => ld,
        0x1E => addi,
        0x29 => ldspr,
        0x33 => bcd,
        0x55 => stor,
        0x65 => read,
        _ => nop,
    }
}
