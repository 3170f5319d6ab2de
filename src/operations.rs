use log::debug;
use rand::{Rng, RngCore};

use crate::constants::{
    DISPLAY_HEIGHT, DISPLAY_WIDTH, FLAG, FONT_GLYPH_SIZE, FONT_START, PIXEL_OFF, PIXEL_ON,
};
use crate::error::Fault;
use crate::opcode::Opcode;
use crate::quirks::Quirks;
use crate::state::State;

/// Everything an operation may need that isn't part of the machine's state
pub struct Context<'a> {
    pub rng: &'a mut dyn RngCore,
    pub quirks: Quirks,
}

/// Every operation runs after the pc has already been moved past its own opcode.
pub type Operation =
    fn(op: &dyn Opcode, state: &mut State, ctx: &mut Context<'_>) -> Result<(), Fault>;

/// unrecognised opcodes consume a cycle and nothing else
pub fn nop(op: &dyn Opcode, _state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    debug!("ignoring unknown opcode {}", op.hex());
    Ok(())
}

/// clear
pub fn clr(_op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.frame_buffer = [[PIXEL_OFF; DISPLAY_WIDTH]; DISPLAY_HEIGHT];
    state.draw_flag = true;
    Ok(())
}

/// PC = STACK.pop()
pub fn rts(_op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.pc = state.pop()?;
    Ok(())
}

/// PC = addr
pub fn jump(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.pc = op.addr();
    Ok(())
}

/// STACK.push(PC); PC = addr
pub fn call(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.push(state.pc)?;
    state.pc = op.addr();
    Ok(())
}

fn skip_if(state: &mut State, condition: bool) -> Result<(), Fault> {
    if condition {
        state.pc += 0x2;
    }
    Ok(())
}

/// if Vx == kk then pc += 2
pub fn ske(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let vx = state.v[op.x() as usize];
    skip_if(state, vx == op.kk())
}

/// if Vx != kk then pc += 2
pub fn skne(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let vx = state.v[op.x() as usize];
    skip_if(state, vx != op.kk())
}

/// if Vx == Vy then pc += 2
pub fn skre(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let (vx, vy) = (state.v[op.x() as usize], state.v[op.y() as usize]);
    skip_if(state, vx == vy)
}

/// if Vx != Vy then pc += 2
pub fn skrne(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let (vx, vy) = (state.v[op.x() as usize], state.v[op.y() as usize]);
    skip_if(state, vx != vy)
}

/// Vx = kk
pub fn load(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] = op.kk();
    Ok(())
}

/// Vx += kk
/// Overflow wraps and VF is left alone
pub fn add(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let x = op.x() as usize;
    state.v[x] = state.v[x].wrapping_add(op.kk());
    Ok(())
}

/// Vx = Vy
pub fn mv(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] = state.v[op.y() as usize];
    Ok(())
}

/// Vx |= Vy
pub fn or(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] |= state.v[op.y() as usize];
    Ok(())
}

/// Vx &= Vy
pub fn and(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] &= state.v[op.y() as usize];
    Ok(())
}

/// Vx ^= Vy
pub fn xor(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] ^= state.v[op.y() as usize];
    Ok(())
}

// The flag-setting operations below write VF before Vx, so with x == 0xF the result wins.

/// Vx += Vy; VF = overflow
pub fn addr(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let (res, over) = state.v[op.x() as usize].overflowing_add(state.v[op.y() as usize]);
    state.v[FLAG] = u8::from(over);
    state.v[op.x() as usize] = res;
    Ok(())
}

/// Vx -= Vy; VF = !underflow
pub fn sub(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let (res, under) = state.v[op.x() as usize].overflowing_sub(state.v[op.y() as usize]);
    state.v[FLAG] = u8::from(!under);
    state.v[op.x() as usize] = res;
    Ok(())
}

/// Vx = Vy - Vx; VF = !underflow
pub fn subn(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let (res, under) = state.v[op.y() as usize].overflowing_sub(state.v[op.x() as usize]);
    state.v[FLAG] = u8::from(!under);
    state.v[op.x() as usize] = res;
    Ok(())
}

fn shift_source(op: &dyn Opcode, state: &State, quirks: Quirks) -> u8 {
    if quirks.shift_reads_vy {
        state.v[op.y() as usize]
    } else {
        state.v[op.x() as usize]
    }
}

/// Vx >>= 1; VF = the bit shifted out
pub fn shr(op: &dyn Opcode, state: &mut State, ctx: &mut Context) -> Result<(), Fault> {
    let source = shift_source(op, state, ctx.quirks);
    state.v[FLAG] = source & 0x1;
    state.v[op.x() as usize] = source >> 1;
    Ok(())
}

/// Vx <<= 1; VF = the bit shifted out
pub fn shl(op: &dyn Opcode, state: &mut State, ctx: &mut Context) -> Result<(), Fault> {
    let source = shift_source(op, state, ctx.quirks);
    state.v[FLAG] = (source & 0x80) >> 7;
    state.v[op.x() as usize] = source << 1;
    Ok(())
}

/// I = addr
pub fn loadi(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.i = op.addr();
    Ok(())
}

/// PC = V0 + addr
pub fn jumpi(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.pc = u16::from(state.v[0x0]) + op.addr();
    Ok(())
}

/// Vx = rand_byte & kk
pub fn rand(op: &dyn Opcode, state: &mut State, ctx: &mut Context) -> Result<(), Fault> {
    let rand_byte: u8 = ctx.rng.gen();
    state.v[op.x() as usize] = rand_byte & op.kk();
    Ok(())
}

/// draw_sprite(x=Vx y=Vy size=n)
/// XORs a sprite from memory i..i+n onto the FrameBuffer.
/// The starting position wraps, but anything running off the right or bottom edge is clipped.
/// Sets VF if any pixels are erased
pub fn draw(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let rows = state.span(state.i, op.n() as usize)?;
    let left = state.v[op.x() as usize] as usize % DISPLAY_WIDTH;
    let top = state.v[op.y() as usize] as usize % DISPLAY_HEIGHT;

    state.v[FLAG] = 0x0;

    for (row, addr) in rows.enumerate() {
        let y = top + row;
        if y >= DISPLAY_HEIGHT {
            break;
        }
        let sprite = state.memory[addr];
        for bit in 0..8 {
            let x = left + bit;
            if x >= DISPLAY_WIDTH {
                break;
            }
            if sprite & (0x80 >> bit) == 0 {
                continue;
            }
            let pixel = &mut state.frame_buffer[y][x];
            if *pixel == PIXEL_ON {
                state.v[FLAG] = 0x1;
            }
            *pixel ^= PIXEL_ON;
        }
    }

    state.draw_flag = true;
    Ok(())
}

/// Keys only go up to 0xF so anything larger is masked down to a valid key
fn key_in(op: &dyn Opcode, state: &State) -> bool {
    state.keypad[(state.v[op.x() as usize] & 0xF) as usize]
}

/// if Vx.pressed then pc += 2
pub fn skpr(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let pressed = key_in(op, state);
    skip_if(state, pressed)
}

/// if !Vx.pressed then pc += 2
pub fn skup(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let pressed = key_in(op, state);
    skip_if(state, !pressed)
}

/// Vx = DT
pub fn moved(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.v[op.x() as usize] = state.delay_timer;
    Ok(())
}

/// Vx = lowest pressed key
/// With nothing pressed the pc is rewound so this same opcode runs again next cycle.
pub fn keyd(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    match state.keypad.iter().position(|&pressed| pressed) {
        Some(key) => state.v[op.x() as usize] = key as u8,
        None => state.pc -= 0x2,
    }
    Ok(())
}

/// DT = Vx
pub fn loads(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.delay_timer = state.v[op.x() as usize];
    Ok(())
}

/// ST = Vx
pub fn ld(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.sound_timer = state.v[op.x() as usize];
    Ok(())
}

/// I += Vx
/// Not limited to 12 bits; only dereferencing I is checked
pub fn addi(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    state.i = state.i.wrapping_add(u16::from(state.v[op.x() as usize]));
    Ok(())
}

/// I = address of the sprite for digit Vx
/// See constants::SPRITE_SHEET
pub fn ldspr(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let digit = u16::from(state.v[op.x() as usize] & 0xF);
    state.i = FONT_START + FONT_GLYPH_SIZE * digit;
    Ok(())
}

/// mem[I..I+3] = bcd(Vx)
pub fn bcd(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let span = state.span(state.i, 3)?;
    let value = state.v[op.x() as usize];
    state.memory[span].copy_from_slice(&[value / 100, value / 10 % 10, value % 10]);
    Ok(())
}

/// mem[I..=I+x] = V0..=Vx
pub fn stor(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let count = op.x() as usize + 1;
    let span = state.span(state.i, count)?;
    state.memory[span].copy_from_slice(&state.v[..count]);
    Ok(())
}

/// V0..=Vx = mem[I..=I+x]
pub fn read(op: &dyn Opcode, state: &mut State, _ctx: &mut Context) -> Result<(), Fault> {
    let count = op.x() as usize + 1;
    let span = state.span(state.i, count)?;
    state.v[..count].copy_from_slice(&state.memory[span]);
    Ok(())
}
