use std::collections::VecDeque;
use std::io::{self, Read};

use log::{info, trace, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::constants::{HISTORY_LEN, KEY_COUNT, MAX_ROM_SIZE, MEMORY_SIZE, PROGRAM_START};
use crate::error::Fault;
use crate::instruction::from_op;
use crate::opcode::{self, Opcode};
use crate::operations::{Context, Operation};
use crate::quirks::Quirks;
use crate::state::{FrameBuffer, State};

/// # Chip-8
/// Chip-8 is a virtual machine and corresponding interpreted language.
///
/// Tracks:
///  - current `state`
///  - `history` of recently fetched opcodes for debugging
///  - the random source consumed by CXKK
///
/// Supplies interfaces for:
/// - loading roms
/// - pressing and releasing keys
/// - advancing the machine one cycle at a time
/// - inspecting its frame buffer for rendering by some display
///
/// Pacing is up to the owner: call `step` at roughly `CLOCK_SPEED` intervals,
/// updating the keypad before each call and reading the frame buffer after.
pub struct Chip8 {
    state: State,
    history: VecDeque<u16>,
    rng: Box<dyn RngCore>,
    quirks: Quirks,
}

impl Chip8 {
    /// A machine whose random source is seeded from the OS
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A machine with a reproducible random source
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// A machine drawing random bytes from `rng`
    pub fn with_rng(rng: impl RngCore + 'static) -> Self {
        Chip8 {
            state: State::new(),
            history: VecDeque::with_capacity(HISTORY_LEN + 1),
            rng: Box::new(rng),
            quirks: Quirks::default(),
        }
    }

    /// The same machine with `quirks` applied to later cycles
    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Copy a ROM image into the program region
    ///
    /// # Arguments
    /// * `rom` the raw bytes of a ROM, at most `MAX_ROM_SIZE` long
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Fault> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Fault::RomTooLarge { len: rom.len() });
        }
        let start = PROGRAM_START as usize;
        self.state.memory[start..start + rom.len()].copy_from_slice(rom);
        info!("loaded {} byte rom", rom.len());
        Ok(())
    }

    /// Load a rom from a source file
    /// If the rom can't be read the machine is left exactly as it was.
    /// At most one byte past `MAX_ROM_SIZE` is read from `reader`.
    ///
    /// # Arguments
    /// * `reader` a file reader that contains a ROM
    pub fn load_rom(&mut self, reader: &mut dyn io::Read) -> io::Result<()> {
        let mut rom = Vec::with_capacity(MAX_ROM_SIZE + 1);
        let limit = MAX_ROM_SIZE as u64 + 1;
        if let Err(e) = reader.take(limit).read_to_end(&mut rom) {
            warn!("unable to read rom: {}", e);
            return Err(e);
        }
        self.load(&rom).map_err(|fault| {
            warn!("unable to load rom: {}", fault);
            io::Error::new(io::ErrorKind::InvalidData, fault)
        })
    }

    /// Advances the machine by a single cycle
    /// - fetches the opcode at pc and moves pc past it
    /// - executes that opcode
    /// - ticks both timers
    ///
    /// If the opcode faults, pc is left pointing at it and the timers don't tick.
    pub fn step(&mut self) -> Result<(), Fault> {
        let start = self.state.pc;
        let op = self.get_op()?;
        trace!(
            "{:04X} v{:02X?} i{:04X} pc{:04X}",
            op,
            self.state.v,
            self.state.i,
            self.state.pc
        );
        self.record(op);

        self.state.pc += 0x2;
        let operation: Operation = from_op(&op);
        let mut ctx = Context {
            rng: self.rng.as_mut(),
            quirks: self.quirks,
        };
        if let Err(fault) = operation(&op, &mut self.state, &mut ctx) {
            warn!("{:04X} at {:04X} faulted: {}", op, start, fault);
            self.state.pc = start;
            return Err(fault);
        }

        self.state.tick_timers();
        Ok(())
    }

    /// Gets the opcode currently pointed at by the pc.
    /// Memory is stored as bytes, but opcodes are 16 bits so we combine two subsequent bytes.
    fn get_op(&self) -> Result<u16, Fault> {
        let pc = self.state.pc as usize;
        if pc + 1 >= MEMORY_SIZE {
            return Err(Fault::MemoryOutOfBounds {
                addr: pc.max(MEMORY_SIZE),
            });
        }
        Ok(opcode::from_bytes(
            self.state.memory[pc],
            self.state.memory[pc + 1],
        ))
    }

    /// Puts an opcode in the history, dropping the oldest past `HISTORY_LEN`
    fn record(&mut self, op: u16) {
        self.history.push_back(op);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
    }

    /// The current 64x32 frame, indexed `[y][x]`
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.state.frame_buffer
    }

    /// Returns the FrameBuffer if it changed since the last call
    pub fn take_frame(&mut self) -> Option<&FrameBuffer> {
        if self.state.draw_flag {
            self.state.draw_flag = false;
            Some(&self.state.frame_buffer)
        } else {
            None
        }
    }

    /// Set the pressed status of key
    ///
    /// # Arguments
    /// * `key` the 8-bit representation of the key that was pressed,
    ///   only its low nibble selects the key
    pub fn key_press(&mut self, key: u8) {
        self.state.keypad[key as usize % KEY_COUNT] = true;
    }

    /// Unset the pressed status of key
    ///
    /// # Arguments
    /// * `key` the 8-bit representation of the key that was released,
    ///   only its low nibble selects the key
    pub fn key_release(&mut self, key: u8) {
        self.state.keypad[key as usize % KEY_COUNT] = false;
    }

    /// Pressed status of keys 0x0 through 0xF
    pub fn keypad(&self) -> &[bool; KEY_COUNT] {
        &self.state.keypad
    }

    /// Mutable keypad, for hosts that poll every key at once
    pub fn keypad_mut(&mut self) -> &mut [bool; KEY_COUNT] {
        &mut self.state.keypad
    }

    /// Whether a tone should currently be playing
    pub fn sound_active(&self) -> bool {
        self.state.sound_timer > 0
    }

    /// Address of the next opcode to be fetched
    pub fn pc(&self) -> u16 {
        self.state.pc
    }

    /// Read-only view of the whole machine state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Recently fetched opcodes, oldest first
    pub fn history(&self) -> impl Iterator<Item = String> + '_ {
        self.history.iter().map(|op| op.hex())
    }

    /// One line per register, timer and the stack pointer, in decimal
    pub fn register_info(&self) -> Vec<String> {
        let state = &self.state;
        let mut info = vec![
            format!("PC: {}", state.pc),
            format!("Index: {}", state.i),
            format!("Stack: {}", state.sp),
            format!("Delay Timer: {}", state.delay_timer),
            format!("Sound Timer: {}", state.sound_timer),
        ];
        info.extend(
            state
                .v
                .iter()
                .enumerate()
                .map(|(n, value)| format!("V{}: {}", n, value)),
        );
        info
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, PIXEL_OFF, PIXEL_ON};

    fn chip8_with(rom: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::with_rng(StepRng::new(0, 1));
        chip8.load(rom).unwrap();
        chip8
    }

    #[test]
    fn test_chip8_gets_op() {
        let mut chip8 = Chip8::new();
        chip8.state.memory[0x200..0x202].copy_from_slice(&[0xAA, 0xBB]);
        assert_eq!(chip8.get_op(), Ok(0xAABB));
    }

    #[test]
    fn test_get_op_faults_at_end_of_memory() {
        let mut chip8 = Chip8::new();
        chip8.state.pc = 0xFFF;
        assert_eq!(
            chip8.get_op(),
            Err(Fault::MemoryOutOfBounds { addr: 0x1000 })
        );
        chip8.state.pc = 0xFFE;
        assert_eq!(chip8.get_op(), Ok(0x0000));
    }

    #[test]
    fn test_cls_rom_clears_and_advances() {
        let mut chip8 = chip8_with(&[0x00, 0xE0]);
        chip8.state.frame_buffer[3][7] = PIXEL_ON;
        chip8.step().unwrap();
        assert!(chip8
            .frame_buffer()
            .iter()
            .all(|row| row.iter().all(|&p| p == PIXEL_OFF)));
        assert_eq!(chip8.pc(), 0x202);
    }

    #[test]
    fn test_unknown_opcode_still_ticks_timers() {
        let mut chip8 = chip8_with(&[0xF0, 0xFF]);
        chip8.state.delay_timer = 2;
        chip8.state.sound_timer = 1;
        chip8.step().unwrap();
        assert_eq!(chip8.pc(), 0x202);
        assert_eq!(chip8.state.delay_timer, 1);
        assert!(!chip8.sound_active());
    }

    #[test]
    fn test_timers_tick_once_per_cycle() {
        // 6005 F015 F018: V0 = 5; DT = V0; ST = V0
        let mut chip8 = chip8_with(&[0x60, 0x05, 0xF0, 0x15, 0xF0, 0x18, 0x12, 0x06]);
        for _ in 0..3 {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.state.delay_timer, 3);
        assert_eq!(chip8.state.sound_timer, 4);
        assert!(chip8.sound_active());
        for _ in 0..10 {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.state.delay_timer, 0);
        assert!(!chip8.sound_active());
    }

    #[test]
    fn test_call_then_return_resumes_after_call() {
        // 0x200: call 0x300
        // 0x300: ret
        let mut chip8 = chip8_with(&[0x23, 0x00]);
        chip8.state.memory[0x300..0x302].copy_from_slice(&[0x00, 0xEE]);
        chip8.step().unwrap();
        assert_eq!(chip8.pc(), 0x300);
        chip8.step().unwrap();
        assert_eq!(chip8.pc(), 0x202);
        assert_eq!(chip8.state.sp, 0);
    }

    #[test]
    fn test_seventeenth_nested_call_overflows() {
        // every call lands on the next call
        let mut rom = Vec::new();
        for n in 1..=17u16 {
            let target = 0x200 + 2 * n;
            rom.extend_from_slice(&[0x20 | (target >> 8) as u8, target as u8]);
        }
        let mut chip8 = chip8_with(&rom);
        for _ in 0..16 {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.state.sp, 16);
        let pc = chip8.pc();
        assert_eq!(chip8.step(), Err(Fault::StackOverflow));
        assert_eq!(chip8.pc(), pc);
        assert_eq!(chip8.state.sp, 16);
    }

    #[test]
    fn test_fault_leaves_pc_and_timers() {
        let mut chip8 = chip8_with(&[0x00, 0xEE]);
        chip8.state.delay_timer = 3;
        assert_eq!(chip8.step(), Err(Fault::StackUnderflow));
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.state.delay_timer, 3);
        // still faulted on retry
        assert_eq!(chip8.step(), Err(Fault::StackUnderflow));
    }

    #[test]
    fn test_key_wait_spins_until_pressed() {
        // F30A: V3 = key
        let mut chip8 = chip8_with(&[0xF3, 0x0A]);
        chip8.state.delay_timer = 10;
        for _ in 0..4 {
            chip8.step().unwrap();
            assert_eq!(chip8.pc(), 0x200);
        }
        assert_eq!(chip8.state.delay_timer, 6);

        chip8.key_press(0xC);
        chip8.step().unwrap();
        assert_eq!(chip8.pc(), 0x202);
        assert_eq!(chip8.state.v[0x3], 0xC);
    }

    #[test]
    fn test_key_press_and_release() {
        let mut chip8 = Chip8::new();
        chip8.key_press(0x5);
        assert!(chip8.keypad()[0x5]);
        chip8.key_release(0x5);
        assert!(!chip8.keypad()[0x5]);
        chip8.keypad_mut()[0xA] = true;
        assert!(chip8.state.keypad[0xA]);
    }

    #[test]
    fn test_key_press_uses_low_nibble() {
        let mut chip8 = Chip8::new();
        chip8.key_press(0x13);
        assert!(chip8.keypad()[0x3]);
        chip8.key_release(0x23);
        assert!(!chip8.keypad()[0x3]);
    }

    #[test]
    fn test_drawing_twice_restores_frame() {
        // A000 D005 D005: draw the "0" glyph twice at 0,0
        let mut chip8 = chip8_with(&[0xA0, 0x50, 0xD0, 0x05, 0xD0, 0x05]);
        chip8.step().unwrap();
        let blank = *chip8.frame_buffer();

        chip8.step().unwrap();
        assert_ne!(*chip8.frame_buffer(), blank);
        assert_eq!(chip8.state.v[0xF], 0);

        chip8.step().unwrap();
        assert_eq!(*chip8.frame_buffer(), blank);
        assert_eq!(chip8.state.v[0xF], 1);
    }

    #[test]
    fn test_drawing_blank_sprite_twice_never_collides() {
        // A300 D005 D005: memory at 0x300 is empty
        let mut chip8 = chip8_with(&[0xA3, 0x00, 0xD0, 0x05, 0xD0, 0x05]);
        for _ in 0..3 {
            chip8.step().unwrap();
            assert_eq!(chip8.state.v[0xF], 0);
        }
    }

    #[test]
    fn test_take_frame_only_after_draw() {
        let mut chip8 = chip8_with(&[0x60, 0x01, 0x00, 0xE0]);
        chip8.step().unwrap();
        assert!(chip8.take_frame().is_none());
        chip8.step().unwrap();
        assert_eq!(
            chip8.take_frame(),
            Some(&[[PIXEL_OFF; DISPLAY_WIDTH]; DISPLAY_HEIGHT])
        );
        assert!(chip8.take_frame().is_none());
    }

    #[test]
    fn test_random_bytes_come_from_injected_rng() {
        // C0FF C1FF
        let mut chip8 = Chip8::with_rng(StepRng::new(7, 1));
        chip8.load(&[0xC0, 0xFF, 0xC1, 0xFF]).unwrap();
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.state.v[0x0..0x2], [7, 8]);
    }

    #[test]
    fn test_seeded_machines_agree() {
        let rom = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];
        let mut a = Chip8::seeded(42);
        let mut b = Chip8::seeded(42);
        a.load(&rom).unwrap();
        b.load(&rom).unwrap();
        for _ in 0..3 {
            a.step().unwrap();
            b.step().unwrap();
        }
        assert_eq!(a.state.v, b.state.v);
    }

    #[test]
    fn test_quirks_reach_operations() {
        // 6103 6208 8216: V1 = 3; V2 = 8; V2 = V1 >> 1
        let rom = [0x61, 0x03, 0x62, 0x08, 0x82, 0x16];
        let mut chip8 = chip8_with(&rom).with_quirks(Quirks::cosmac_vip());
        for _ in 0..3 {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.state.v[0x2], 0x1);
        assert_eq!(chip8.state.v[0xF], 0x1);
    }

    #[test]
    fn test_history_keeps_last_fifty() {
        // 1200: jump to self
        let mut chip8 = chip8_with(&[0x12, 0x00]);
        for _ in 0..60 {
            chip8.step().unwrap();
        }
        let history: Vec<String> = chip8.history().collect();
        assert_eq!(history.len(), 50);
        assert!(history.iter().all(|op| op == "1200"));
    }

    #[test]
    fn test_history_is_oldest_first() {
        let mut chip8 = chip8_with(&[0x60, 0x01, 0xA2, 0x2A, 0x00, 0xE0]);
        for _ in 0..3 {
            chip8.step().unwrap();
        }
        let history: Vec<String> = chip8.history().collect();
        assert_eq!(history, ["6001", "A22A", "00E0"]);
    }

    #[test]
    fn test_register_info() {
        let mut chip8 = chip8_with(&[0x6A, 0xFF]);
        chip8.step().unwrap();
        let info = chip8.register_info();
        assert_eq!(info.len(), 5 + 16);
        assert_eq!(info[0], "PC: 514");
        assert_eq!(info[1], "Index: 0");
        assert_eq!(info[2], "Stack: 0");
        assert_eq!(info[5], "V0: 0");
        assert_eq!(info[15], "V10: 255");
    }

    #[test]
    fn test_load_writes_program_region_only() {
        let mut chip8 = Chip8::new();
        let before = *chip8.state();
        chip8.load(&[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(chip8.state.memory[0x200..0x203], [0x12, 0x34, 0x56]);
        assert_eq!(chip8.state.memory[..0x200], before.memory[..0x200]);
        assert_eq!(chip8.state.memory[0x203..], before.memory[0x203..]);
    }

    #[test]
    fn test_load_fits_exactly_max_rom() {
        let mut chip8 = Chip8::new();
        assert_eq!(chip8.load(&[0xAA; 3584]), Ok(()));
        assert_eq!(chip8.state.memory[0xFFF], 0xAA);
    }

    #[test]
    fn test_load_rejects_oversized_rom() {
        let mut chip8 = Chip8::new();
        let before = *chip8.state();
        assert_eq!(
            chip8.load(&[0xAA; 3585]),
            Err(Fault::RomTooLarge { len: 3585 })
        );
        assert_eq!(*chip8.state(), before);
    }

    #[test]
    fn test_load_rom_from_reader() {
        let mut chip8 = Chip8::new();
        let mut rom: &[u8] = &[0x00, 0xE0];
        chip8.load_rom(&mut rom).unwrap();
        assert_eq!(chip8.state.memory[0x200..0x202], [0x00, 0xE0]);
    }

    struct Unreadable;

    impl io::Read for Unreadable {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no rom here"))
        }
    }

    #[test]
    fn test_load_rom_failure_keeps_power_on_state() {
        let mut chip8 = Chip8::new();
        let before = *chip8.state();
        let err = chip8.load_rom(&mut Unreadable).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(*chip8.state(), before);
    }

    #[test]
    fn test_load_rom_oversized_is_invalid_data() {
        let mut chip8 = Chip8::new();
        let big = vec![0x11; 4000];
        let err = chip8.load_rom(&mut big.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(chip8.state.memory[0x200], 0x00);
    }

    /// An endless source that counts how many bytes were handed out
    struct Endless {
        served: usize,
    }

    impl io::Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            for byte in buf.iter_mut() {
                *byte = 0x11;
            }
            self.served += buf.len();
            Ok(buf.len())
        }
    }

    #[test]
    fn test_load_rom_stops_reading_past_max_rom() {
        let mut chip8 = Chip8::new();
        let mut endless = Endless { served: 0 };
        let err = chip8.load_rom(&mut endless).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(endless.served <= MAX_ROM_SIZE + 1, "{}", endless.served);
        assert_eq!(chip8.state.memory[0x200], 0x00);
    }
}
