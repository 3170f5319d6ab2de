use std::ops::Range;

use crate::constants::{
    DISPLAY_HEIGHT, DISPLAY_WIDTH, FONT_START, KEY_COUNT, MEMORY_SIZE, PIXEL_OFF, PROGRAM_START,
    REGISTER_COUNT, SPRITE_SHEET, STACK_SIZE,
};
use crate::error::Fault;

/// The FrameBuffer is indexed as [y][x]; each pixel is either `PIXEL_ON` or `PIXEL_OFF`
pub type FrameBuffer = [[u32; DISPLAY_WIDTH]; DISPLAY_HEIGHT];

/// A snapshot of the Chip-8 internal state
///
/// ## CPU
/// Registers
/// - (v) 16 primary 8-bit registers (V0..VF)
///     - the first 15 (V0..VE) are general purpose registers
///     - the 16th (VF) is the carry flag
/// - (i) a 16-bit memory address register
///
/// Counter
/// - (pc) a 16-bit program counter
///
/// Pointer
/// - (sp) the number of return addresses on the stack
///
/// Timers
/// - 2 8-bit timers (delay & sound), each ticked down once per cycle
///
/// ## Memory
/// - 16 slot stack of return addresses
/// - 4096 bytes of addressable memory
///     - 0x050..0x0A0 holds the sprite sheet
///     - 0x200.. holds the loaded ROM
/// - 64x32 frame buffer
///
/// ## Input
/// - the pressed status of keys 0..F, written by whoever owns the machine
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct State {
    pub v: [u8; REGISTER_COUNT],
    pub i: u16,
    pub pc: u16,
    pub sp: u8,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub stack: [u16; STACK_SIZE],
    pub memory: [u8; MEMORY_SIZE],
    pub frame_buffer: FrameBuffer,
    pub keypad: [bool; KEY_COUNT],
    pub draw_flag: bool,
}

impl State {
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        let font = FONT_START as usize;
        memory[font..font + SPRITE_SHEET.len()].copy_from_slice(&SPRITE_SHEET);

        State {
            v: [0; REGISTER_COUNT],
            i: 0,
            pc: PROGRAM_START,
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            stack: [0; STACK_SIZE],
            memory,
            frame_buffer: [[PIXEL_OFF; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
            keypad: [false; KEY_COUNT],
            draw_flag: false,
        }
    }

    /// Pushes a return address
    pub fn push(&mut self, addr: u16) -> Result<(), Fault> {
        let slot = self.stack.get_mut(self.sp as usize).ok_or(Fault::StackOverflow)?;
        *slot = addr;
        self.sp += 1;
        Ok(())
    }

    /// Pops the most recently pushed return address
    pub fn pop(&mut self) -> Result<u16, Fault> {
        if self.sp == 0 {
            return Err(Fault::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp as usize])
    }

    /// The memory indices `start..start + len`, provided they all exist.
    /// Otherwise names the first address that falls off the end of memory.
    pub fn span(&self, start: u16, len: usize) -> Result<Range<usize>, Fault> {
        let start = start as usize;
        let end = start + len;
        if len > 0 && end > MEMORY_SIZE {
            return Err(Fault::MemoryOutOfBounds {
                addr: start.max(MEMORY_SIZE),
            });
        }
        Ok(start..end)
    }

    /// Decrements both timers, stopping at 0
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
