/// # Opcodes
///
/// Every instruction is a 16-bit word, stored big-endian in two consecutive bytes.
/// Dispatch happens in two steps:
/// - `(n, _, _, _)` picks the instruction family
/// - `(_, _, _, n)` or `(_, _, n, n)` picks the instruction within families 0x0, 0x8, 0xE and 0xF
///
/// The remaining nibbles are operands.
/// - `(_, n, n, n)` a 12-bit address
/// - `(_, _, n, n)` an immediate byte assigned to and/or compared with Vx
/// - `(_, n, _, _)` the register Vx, or the range of registers V0..=Vx
/// - `(_, _, n, _)` the register Vy
/// - `(_, _, _, n)` a sprite height for draws
pub trait Opcode {
    /// The raw instruction word.
    fn word(&self) -> u16;

    /// Returns the Opcode's component nibbles.
    fn nibbles(&self) -> (u8, u8, u8, u8) {
        (self.family(), self.x(), self.y(), self.n())
    }

    /// The Opcode's most significant nibble.
    /// `[f___]`
    fn family(&self) -> u8 {
        ((self.word() & 0xF000) >> 12) as u8
    }

    /// `[_x__]`
    fn x(&self) -> u8 {
        ((self.word() & 0x0F00) >> 8) as u8
    }

    /// `[__y_]`
    fn y(&self) -> u8 {
        ((self.word() & 0x00F0) >> 4) as u8
    }

    /// `[___n]`
    fn n(&self) -> u8 {
        (self.word() & 0x000F) as u8
    }

    /// The Opcode's least significant byte.
    /// `[__kk]`
    fn kk(&self) -> u8 {
        (self.word() & 0x00FF) as u8
    }

    /// The Opcode without its most significant nibble.
    /// `[_adr]`
    fn addr(&self) -> u16 {
        self.word() & 0x0FFF
    }

    /// Four uppercase hex digits, as shown in the instruction history.
    fn hex(&self) -> String {
        format!("{:04X}", self.word())
    }
}

impl Opcode for u16 {
    fn word(&self) -> u16 {
        *self
    }
}

/// Combines two bytes read from memory into a single opcode.
pub fn from_bytes(high: u8, low: u8) -> u16 {
    u16::from(high) << 8 | u16::from(low)
}
