use log::trace;

use crate::bus::Bus;
use crate::constants::{ADDRESS_MASK, GLYPH_SIZE, STACK_DEPTH};
use crate::error::Fault;
use crate::instruction::Instruction;
use crate::state::State;

/// Fetch, decode and execute the instruction at the pc.
///
/// The pc is moved past the fetched word before the instruction runs, so
/// jumps, calls and skips all work relative to the following instruction.
pub fn step(state: &State, bus: &mut dyn Bus) -> Result<State, Fault> {
    let op = state.fetch()?;
    let instruction = Instruction::decode(op)?;
    trace!("{:03X}  {}  {:?}", state.pc, op, instruction);

    let fetched = State {
        pc: state.pc + 0x2,
        ..*state
    };
    execute(instruction, &fetched, bus)
}

/// Apply a single decoded instruction to `state`.
pub fn execute(instruction: Instruction, state: &State, bus: &mut dyn Bus) -> Result<State, Fault> {
    use Instruction::*;

    match instruction {
        Nop => Ok(*state),
        Clear => Ok(clr(state, bus)),
        Return => rts(state),
        Jump { addr } => Ok(jump(state, addr)),
        Call { addr } => call(state, addr),
        SkipEqual { x, kk } => Ok(skip_if(state, state.v[x as usize] == kk)),
        SkipNotEqual { x, kk } => Ok(skip_if(state, state.v[x as usize] != kk)),
        SkipRegistersEqual { x, y } => Ok(skip_if(
            state,
            state.v[x as usize] == state.v[y as usize],
        )),
        SkipRegistersNotEqual { x, y } => Ok(skip_if(
            state,
            state.v[x as usize] != state.v[y as usize],
        )),
        Load { x, kk } => Ok(load(state, x, kk)),
        AddImmediate { x, kk } => Ok(add(state, x, kk)),
        Move { x, y } => Ok(alu(state, x, y, |_, vy| vy)),
        Or { x, y } => Ok(alu(state, x, y, |vx, vy| vx | vy)),
        And { x, y } => Ok(alu(state, x, y, |vx, vy| vx & vy)),
        Xor { x, y } => Ok(alu(state, x, y, |vx, vy| vx ^ vy)),
        Add { x, y } => Ok(add_registers(state, x, y)),
        Sub { x, y } => Ok(sub(state, x, y)),
        SubReversed { x, y } => Ok(subn(state, x, y)),
        ShiftRight { x } => Ok(shr(state, x)),
        ShiftLeft { x } => Ok(shl(state, x)),
        LoadIndex { addr } => Ok(loadi(state, addr)),
        JumpOffset { addr } => Ok(jumpi(state, addr)),
        Random { x, kk } => Ok(rand(state, bus, x, kk)),
        Draw { x, y, n } => draw(state, bus, x, y, n),
        SkipKeyPressed { x } => {
            let pressed = bus.is_key_pressed(state.v[x as usize])?;
            Ok(skip_if(state, pressed))
        }
        SkipKeyNotPressed { x } => {
            let pressed = bus.is_key_pressed(state.v[x as usize])?;
            Ok(skip_if(state, !pressed))
        }
        ReadDelay { x } => Ok(load(state, x, bus.delay_timer())),
        WaitKey { x } => Ok(keyd(state, bus, x)),
        SetDelay { x } => {
            bus.set_delay_timer(state.v[x as usize]);
            Ok(*state)
        }
        SetSound { x } => {
            bus.set_sound_timer(state.v[x as usize]);
            Ok(*state)
        }
        AddIndex { x } => Ok(addi(state, x)),
        Glyph { x } => Ok(ldspr(state, x)),
        StoreBcd { x } => bcd(state, x),
        StoreRegisters { x } => stor(state, x),
        LoadRegisters { x } => read(state, x),
    }
}

/// clear
fn clr(state: &State, bus: &mut dyn Bus) -> State {
    bus.clear_display();
    *state
}

/// PC = STACK.pop()
fn rts(state: &State) -> Result<State, Fault> {
    let sp = state.sp.checked_sub(0x1).ok_or(Fault::StackUnderflow)?;
    Ok(State {
        pc: state.stack[sp as usize],
        sp,
        ..*state
    })
}

/// PC = addr
fn jump(state: &State, addr: u16) -> State {
    State { pc: addr, ..*state }
}

/// STACK.push(PC); PC = addr
fn call(state: &State, addr: u16) -> Result<State, Fault> {
    if state.sp as usize >= STACK_DEPTH {
        return Err(Fault::StackOverflow);
    }
    let mut stack = state.stack;
    stack[state.sp as usize] = state.pc;
    Ok(State {
        pc: addr,
        sp: state.sp + 0x1,
        stack,
        ..*state
    })
}

/// if condition then pc += 2
fn skip_if(state: &State, condition: bool) -> State {
    if condition {
        State {
            pc: state.pc + 0x2,
            ..*state
        }
    } else {
        *state
    }
}

/// Vx = kk
fn load(state: &State, x: u8, kk: u8) -> State {
    let mut v = state.v;
    v[x as usize] = kk;
    State { v, ..*state }
}

/// Vx += kk
/// Add kk to Vx; allow for overflow but implicitly drop it
fn add(state: &State, x: u8, kk: u8) -> State {
    let mut v = state.v;
    v[x as usize] = v[x as usize].wrapping_add(kk);
    State { v, ..*state }
}

/// Vx = f(Vx, Vy) with no flag side effects
fn alu(state: &State, x: u8, y: u8, f: impl Fn(u8, u8) -> u8) -> State {
    let mut v = state.v;
    v[x as usize] = f(v[x as usize], v[y as usize]);
    State { v, ..*state }
}

/// Vx = result; VF = flag. The flag is written last, so it wins when x is F.
fn with_flag(state: &State, x: u8, result: u8, flag: bool) -> State {
    let mut v = state.v;
    v[x as usize] = result;
    v[0xF] = flag as u8;
    State { v, ..*state }
}

/// Vx += Vy; VF = carry
fn add_registers(state: &State, x: u8, y: u8) -> State {
    let (res, carry) = state.v[x as usize].overflowing_add(state.v[y as usize]);
    with_flag(state, x, res, carry)
}

/// Vx -= Vy; VF = !borrow
fn sub(state: &State, x: u8, y: u8) -> State {
    let (res, borrow) = state.v[x as usize].overflowing_sub(state.v[y as usize]);
    with_flag(state, x, res, !borrow)
}

/// Vx = Vy - Vx; VF = !borrow
fn subn(state: &State, x: u8, y: u8) -> State {
    let (res, borrow) = state.v[y as usize].overflowing_sub(state.v[x as usize]);
    with_flag(state, x, res, !borrow)
}

/// Vx >>= 1; VF = the bit shifted out
fn shr(state: &State, x: u8) -> State {
    let vx = state.v[x as usize];
    with_flag(state, x, vx >> 1, vx & 0x1 == 0x1)
}

/// Vx <<= 1; VF = the bit shifted out
fn shl(state: &State, x: u8) -> State {
    let vx = state.v[x as usize];
    with_flag(state, x, vx << 1, vx & 0x80 == 0x80)
}

/// I = addr
fn loadi(state: &State, addr: u16) -> State {
    State {
        i: addr & ADDRESS_MASK,
        ..*state
    }
}

/// PC = V0 + addr
/// Not masked: a target past the end of memory faults on the next fetch
fn jumpi(state: &State, addr: u16) -> State {
    State {
        pc: u16::from(state.v[0x0]) + addr,
        ..*state
    }
}

/// Vx = rand_byte & kk
fn rand(state: &State, bus: &mut dyn Bus, x: u8, kk: u8) -> State {
    let rand_byte = bus.random_byte();
    load(state, x, rand_byte & kk)
}

/// draw_sprite(x=Vx y=Vy size=n)
/// XORs a sprite from memory i..i+n at position Vx, Vy on the display.
/// Sets VF if any pixels were erased
fn draw(state: &State, bus: &mut dyn Bus, x: u8, y: u8, n: u8) -> Result<State, Fault> {
    let sprite = state.memory_slice(state.i, n as usize)?;
    let collision = bus.draw_sprite(state.v[x as usize], state.v[y as usize], sprite);
    let mut v = state.v;
    v[0xF] = collision as u8;
    Ok(State { v, ..*state })
}

/// await keypress for Vx
/// A cancelled wait leaves the pc on this instruction so it runs again on resume
fn keyd(state: &State, bus: &mut dyn Bus, x: u8) -> State {
    match bus.wait_for_key() {
        Some(key) => load(state, x, key),
        None => State {
            pc: state.pc.wrapping_sub(0x2),
            ..*state
        },
    }
}

/// I += Vx
fn addi(state: &State, x: u8) -> State {
    State {
        i: (state.i + u16::from(state.v[x as usize])) & ADDRESS_MASK,
        ..*state
    }
}

/// I = Vx * 5
/// Set I to the address of the glyph for Vx in the sprite sheet
fn ldspr(state: &State, x: u8) -> State {
    State {
        i: (u16::from(state.v[x as usize]) * GLYPH_SIZE) & ADDRESS_MASK,
        ..*state
    }
}

/// mem[I..I+3] = bcd(Vx)
/// Store BCD repr of Vx in memory starting at address i
fn bcd(state: &State, x: u8) -> Result<State, Fault> {
    let vx = state.v[x as usize];
    let digits = [vx / 100, vx / 10 % 10, vx % 10];
    let mut next = *state;
    next.memory_slice_mut(state.i, digits.len())?
        .copy_from_slice(&digits);
    Ok(next)
}

/// mem[I..=I+x] = V0..=Vx
fn stor(state: &State, x: u8) -> Result<State, Fault> {
    let count = x as usize + 1;
    let mut next = *state;
    next.memory_slice_mut(state.i, count)?
        .copy_from_slice(&state.v[..count]);
    Ok(next)
}

/// V0..=Vx = mem[I..=I+x]
fn read(state: &State, x: u8) -> Result<State, Fault> {
    let count = x as usize + 1;
    let mut v = state.v;
    v[..count].copy_from_slice(state.memory_slice(state.i, count)?);
    Ok(State { v, ..*state })
}

#[cfg(test)]
mod test_operations {
    use super::*;
    use crate::bus::Devices;
    use crate::opcode::Opcode;

    /// A bus over real devices with a fixed random byte and a scripted key wait
    struct MockBus {
        devices: Devices,
        random: u8,
        next_key: Option<u8>,
    }

    impl MockBus {
        fn new() -> Self {
            MockBus {
                devices: Devices::new(),
                random: 0xFF,
                next_key: None,
            }
        }
    }

    impl Bus for MockBus {
        fn clear_display(&mut self) {
            self.devices.display.clear();
        }

        fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
            self.devices.display.draw(x, y, sprite)
        }

        fn is_key_pressed(&self, key: u8) -> Result<bool, Fault> {
            self.devices.keypad.is_pressed(key)
        }

        fn wait_for_key(&mut self) -> Option<u8> {
            self.next_key.take()
        }

        fn delay_timer(&self) -> u8 {
            self.devices.timers.delay()
        }

        fn set_delay_timer(&mut self, value: u8) {
            self.devices.timers.set_delay(value);
        }

        fn set_sound_timer(&mut self, value: u8) {
            self.devices.timers.set_sound(value);
        }

        fn random_byte(&mut self) -> u8 {
            self.random
        }
    }

    /// State as it is right after fetching the instruction at 0x200
    fn fetched() -> State {
        State {
            pc: 0x202,
            ..State::new()
        }
    }

    fn run_on(word: u16, state: &State, bus: &mut MockBus) -> Result<State, Fault> {
        let instruction = Instruction::decode(Opcode::new(word))?;
        execute(instruction, state, bus)
    }

    fn run(word: u16, state: &State) -> State {
        run_on(word, state, &mut MockBus::new()).unwrap()
    }

    #[test]
    fn test_0000_nop() {
        let state = fetched();
        assert_eq!(run(0x0000, &state), state);
    }

    #[test]
    fn test_00e0_cls() {
        let mut bus = MockBus::new();
        bus.devices.display.draw(0, 0, &[0xFF]);
        run_on(0x00E0, &fetched(), &mut bus).unwrap();
        assert!(bus.devices.display.snapshot().iter().flatten().all(|&p| p == 0));
    }

    #[test]
    fn test_00ee_ret() {
        let mut state = fetched();
        state.sp = 0x1;
        state.stack[0] = 0x0ABC;
        let state = run(0x00EE, &state);
        assert_eq!(state.sp, 0x0);
        assert_eq!(state.pc, 0x0ABC);
    }

    #[test]
    fn test_00ee_ret_underflows() {
        assert_eq!(
            run_on(0x00EE, &fetched(), &mut MockBus::new()),
            Err(Fault::StackUnderflow)
        );
    }

    #[test]
    fn test_1nnn_jp() {
        let state = run(0x1ABC, &fetched());
        assert_eq!(state.pc, 0x0ABC);
    }

    #[test]
    fn test_2nnn_call() {
        let state = run(0x2123, &fetched());
        assert_eq!(state.sp, 0x1);
        assert_eq!(state.call_stack(), &[0x0202]);
        assert_eq!(state.pc, 0x0123);
    }

    #[test]
    fn test_2nnn_call_overflows() {
        let mut state = fetched();
        for _ in 0..STACK_DEPTH {
            state = run(0x2200, &state);
        }
        assert_eq!(state.sp as usize, STACK_DEPTH);
        assert_eq!(
            run_on(0x2200, &state, &mut MockBus::new()),
            Err(Fault::StackOverflow)
        );
    }

    #[test]
    fn test_3xkk_se_skips() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        assert_eq!(run(0x3111, &state).pc, 0x0204);
    }

    #[test]
    fn test_3xkk_se_doesntskip() {
        assert_eq!(run(0x3111, &fetched()).pc, 0x0202);
    }

    #[test]
    fn test_4xkk_sne_skips() {
        assert_eq!(run(0x4111, &fetched()).pc, 0x0204);
    }

    #[test]
    fn test_4xkk_sne_doesntskip() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        assert_eq!(run(0x4111, &state).pc, 0x0202);
    }

    #[test]
    fn test_5xy0_se_skips() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        state.v[0x2] = 0x11;
        assert_eq!(run(0x5120, &state).pc, 0x0204);
    }

    #[test]
    fn test_5xy0_se_doesntskip() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        assert_eq!(run(0x5120, &state).pc, 0x0202);
    }

    #[test]
    fn test_6xkk_ld() {
        let mut state = fetched();
        state.v[0x1] = 0x99;
        assert_eq!(run(0x6122, &state).v[0x1], 0x22);
    }

    #[test]
    fn test_7xkk_add() {
        let mut state = fetched();
        state.v[0x1] = 0x1;
        assert_eq!(run(0x7122, &state).v[0x1], 0x23);
    }

    #[test]
    fn test_7xkk_add_wraps_without_flag() {
        let mut state = fetched();
        state.v[0x1] = 0xFF;
        state.v[0xF] = 0x7;
        let state = run(0x7101, &state);
        assert_eq!(state.v[0x1], 0x00);
        assert_eq!(state.v[0xF], 0x7);
    }

    #[test]
    fn test_8xy0_ld() {
        let mut state = fetched();
        state.v[0x2] = 0x1;
        assert_eq!(run(0x8120, &state).v[0x1], 0x1);
    }

    #[test]
    fn test_8xy1_or() {
        let mut state = fetched();
        state.v[0x1] = 0x6;
        state.v[0x2] = 0x3;
        assert_eq!(run(0x8121, &state).v[0x1], 0x7);
    }

    #[test]
    fn test_8xy2_and() {
        let mut state = fetched();
        state.v[0x1] = 0x6;
        state.v[0x2] = 0x3;
        assert_eq!(run(0x8122, &state).v[0x1], 0x2);
    }

    #[test]
    fn test_8xy3_xor() {
        let mut state = fetched();
        state.v[0x1] = 0x6;
        state.v[0x2] = 0x3;
        state.v[0xF] = 0x5;
        let state = run(0x8123, &state);
        assert_eq!(state.v[0x1], 0x5);
        assert_eq!(state.v[0xF], 0x5);
    }

    #[test]
    fn test_8xy4_add_nocarry() {
        let mut state = fetched();
        state.v[0x1] = 0x10;
        state.v[0x2] = 0x05;
        let state = run(0x8124, &state);
        assert_eq!(state.v[0x1], 0x15);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_8xy4_add_carry() {
        let mut state = fetched();
        state.v[0x1] = 0xFF;
        state.v[0x2] = 0x01;
        let state = run(0x8124, &state);
        assert_eq!(state.v[0x1], 0x00);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xy5_sub_noborrow() {
        let mut state = fetched();
        state.v[0x1] = 0x33;
        state.v[0x2] = 0x11;
        let state = run(0x8125, &state);
        assert_eq!(state.v[0x1], 0x22);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xy5_sub_borrow() {
        let mut state = fetched();
        state.v[0x1] = 0x01;
        state.v[0x2] = 0x02;
        let state = run(0x8125, &state);
        assert_eq!(state.v[0x1], 0xFF);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_8xy5_sub_equal_is_not_a_borrow() {
        let mut state = fetched();
        state.v[0x1] = 0x42;
        state.v[0x2] = 0x42;
        let state = run(0x8125, &state);
        assert_eq!(state.v[0x1], 0x00);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xy6_shr_lsb() {
        let mut state = fetched();
        state.v[0x1] = 0x5;
        let state = run(0x8106, &state);
        assert_eq!(state.v[0x1], 0x2);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xy6_shr_nolsb() {
        let mut state = fetched();
        state.v[0x1] = 0x4;
        let state = run(0x8106, &state);
        assert_eq!(state.v[0x1], 0x2);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_8xy7_subn_noborrow() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        state.v[0x2] = 0x33;
        let state = run(0x8127, &state);
        assert_eq!(state.v[0x1], 0x22);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xy7_subn_borrow() {
        let mut state = fetched();
        state.v[0x1] = 0x12;
        state.v[0x2] = 0x11;
        let state = run(0x8127, &state);
        assert_eq!(state.v[0x1], 0xFF);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_8xye_shl_msb() {
        let mut state = fetched();
        state.v[0x1] = 0xFF;
        let state = run(0x810E, &state);
        // 0xFF << 1 = 0x01FE
        assert_eq!(state.v[0x1], 0xFE);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_8xye_shl_nomsb() {
        let mut state = fetched();
        state.v[0x1] = 0x4;
        let state = run(0x810E, &state);
        assert_eq!(state.v[0x1], 0x8);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_8xy4_flag_wins_over_vf_result() {
        let mut state = fetched();
        state.v[0xF] = 0xFF;
        state.v[0x1] = 0x02;
        let state = run(0x8F14, &state);
        assert_eq!(state.v[0xF], 0x1);
    }

    #[test]
    fn test_9xy0_sne_skips() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        assert_eq!(run(0x9120, &state).pc, 0x0204);
    }

    #[test]
    fn test_9xy0_sne_doesntskip() {
        let mut state = fetched();
        state.v[0x1] = 0x11;
        state.v[0x2] = 0x11;
        assert_eq!(run(0x9120, &state).pc, 0x0202);
    }

    #[test]
    fn test_annn_ld() {
        assert_eq!(run(0xAABC, &fetched()).i, 0xABC);
    }

    #[test]
    fn test_bnnn_jp() {
        let mut state = fetched();
        state.v[0x0] = 0x2;
        assert_eq!(run(0xBABC, &state).pc, 0xABE);
    }

    #[test]
    fn test_cxkk_rnd_masks_random_byte() {
        let mut bus = MockBus::new();
        bus.random = 0b1010_1010;
        let state = run_on(0xC10F, &fetched(), &mut bus).unwrap();
        assert_eq!(state.v[0x1], 0b0000_1010);
    }

    #[test]
    fn test_dxyn_drw_draws() {
        let mut bus = MockBus::new();
        let mut state = fetched();
        state.v[0x0] = 0x1;
        // Draw the 0x0 sprite with a 1x 1y offset
        let state = run_on(0xD005, &state, &mut bus).unwrap();
        let frame = bus.devices.display.snapshot();
        assert_eq!(frame[1][1..5], [1, 1, 1, 1]);
        assert_eq!(frame[2][1..5], [1, 0, 0, 1]);
        assert_eq!(frame[3][1..5], [1, 0, 0, 1]);
        assert_eq!(frame[4][1..5], [1, 0, 0, 1]);
        assert_eq!(frame[5][1..5], [1, 1, 1, 1]);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_dxyn_drw_collides() {
        let mut bus = MockBus::new();
        let mut state = fetched();
        state.i = 0x300;
        state.memory[0x300] = 0xFF;
        let state = run_on(0xD011, &state, &mut bus).unwrap();
        assert_eq!(state.v[0xF], 0x0);
        assert_eq!(bus.devices.display.snapshot()[0][0..8], [1; 8]);

        let state = run_on(0xD011, &state, &mut bus).unwrap();
        assert_eq!(state.v[0xF], 0x1);
        assert_eq!(bus.devices.display.snapshot()[0][0..8], [0; 8]);
    }

    #[test]
    fn test_dxyn_drw_wraps() {
        let mut bus = MockBus::new();
        let mut state = fetched();
        state.i = 0x300;
        state.memory[0x300] = 0xFF;
        state.v[0x1] = 60;
        state.v[0x2] = 7;
        run_on(0xD121, &state, &mut bus).unwrap();
        let frame = bus.devices.display.snapshot();
        assert_eq!(frame[7][60..64], [1, 1, 1, 1]);
        assert_eq!(frame[7][0..4], [1, 1, 1, 1]);
        assert_eq!(frame[8][0..4], [0, 0, 0, 0]);
    }

    #[test]
    fn test_dxyn_drw_reads_past_memory() {
        let mut state = fetched();
        state.i = 0xFFE;
        assert_eq!(
            run_on(0xD003, &state, &mut MockBus::new()),
            Err(Fault::MemoryOutOfBounds { address: 0xFFE })
        );
    }

    #[test]
    fn test_ex9e_skp_skips() {
        let mut bus = MockBus::new();
        bus.devices.keypad.press(0xE).unwrap();
        let mut state = fetched();
        state.v[0x1] = 0xE;
        assert_eq!(run_on(0xE19E, &state, &mut bus).unwrap().pc, 0x0204);
    }

    #[test]
    fn test_ex9e_skp_doesntskip() {
        assert_eq!(run(0xE19E, &fetched()).pc, 0x0202);
    }

    #[test]
    fn test_ex9e_skp_rejects_invalid_key() {
        let mut state = fetched();
        state.v[0x1] = 0x10;
        assert_eq!(
            run_on(0xE19E, &state, &mut MockBus::new()),
            Err(Fault::InvalidKeyIndex { key: 0x10 })
        );
    }

    #[test]
    fn test_exa1_sknp_skips() {
        assert_eq!(run(0xE1A1, &fetched()).pc, 0x0204);
    }

    #[test]
    fn test_exa1_sknp_doesntskip() {
        let mut bus = MockBus::new();
        bus.devices.keypad.press(0xE).unwrap();
        let mut state = fetched();
        state.v[0x1] = 0xE;
        assert_eq!(run_on(0xE1A1, &state, &mut bus).unwrap().pc, 0x0202);
    }

    #[test]
    fn test_fx07_ld() {
        let mut bus = MockBus::new();
        bus.devices.timers.set_delay(0xF);
        let state = run_on(0xF107, &fetched(), &mut bus).unwrap();
        assert_eq!(state.v[0x1], 0xF);
    }

    #[test]
    fn test_fx0a_ld_stores_key() {
        let mut bus = MockBus::new();
        bus.next_key = Some(0xB);
        let state = run_on(0xF30A, &fetched(), &mut bus).unwrap();
        assert_eq!(state.v[0x3], 0xB);
        assert_eq!(state.pc, 0x0202);
    }

    #[test]
    fn test_fx0a_ld_cancelled_rewinds() {
        let state = run(0xF30A, &fetched());
        assert_eq!(state.v[0x3], 0x0);
        assert_eq!(state.pc, 0x0200);
    }

    #[test]
    fn test_fx15_ld() {
        let mut bus = MockBus::new();
        let mut state = fetched();
        state.v[0x1] = 0xF;
        run_on(0xF115, &state, &mut bus).unwrap();
        assert_eq!(bus.devices.timers.delay(), 0xF);
    }

    #[test]
    fn test_fx18_ld() {
        let mut bus = MockBus::new();
        let mut state = fetched();
        state.v[0x1] = 0xF;
        run_on(0xF118, &state, &mut bus).unwrap();
        assert_eq!(bus.devices.timers.sound(), 0xF);
    }

    #[test]
    fn test_fx1e_add() {
        let mut state = fetched();
        state.i = 0x1;
        state.v[0x1] = 0x1;
        assert_eq!(run(0xF11E, &state).i, 0x2);
    }

    #[test]
    fn test_fx1e_add_masks_to_12_bits() {
        let mut state = fetched();
        state.i = 0xFFF;
        state.v[0x1] = 0x2;
        state.v[0xF] = 0x0;
        let state = run(0xF11E, &state);
        assert_eq!(state.i, 0x001);
        assert_eq!(state.v[0xF], 0x0);
    }

    #[test]
    fn test_fx29_ld() {
        let mut state = fetched();
        state.v[0x1] = 0x2;
        assert_eq!(run(0xF129, &state).i, 0xA);
    }

    #[test]
    fn test_fx33_ld() {
        let mut state = fetched();
        state.v[0x1] = 157;
        state.i = 0x300;
        let state = run(0xF133, &state);
        assert_eq!(state.memory[0x300..0x303], [0x1, 0x5, 0x7]);
    }

    #[test]
    fn test_fx33_ld_past_memory() {
        let mut state = fetched();
        state.i = 0xFFE;
        assert_eq!(
            run_on(0xF133, &state, &mut MockBus::new()),
            Err(Fault::MemoryOutOfBounds { address: 0xFFE })
        );
    }

    #[test]
    fn test_fx55_ld() {
        let mut state = fetched();
        state.i = 0x300;
        state.v[0x0..0x6].copy_from_slice(&[0x1, 0x2, 0x3, 0x4, 0x5, 0x6]);
        let state = run(0xF455, &state);
        assert_eq!(state.memory[0x300..0x306], [0x1, 0x2, 0x3, 0x4, 0x5, 0x0]);
        assert_eq!(state.i, 0x300);
    }

    #[test]
    fn test_fx65_ld() {
        let mut state = fetched();
        state.i = 0x300;
        state.memory[0x300..0x306].copy_from_slice(&[0x1, 0x2, 0x3, 0x4, 0x5, 0x6]);
        let state = run(0xF465, &state);
        assert_eq!(state.v[0x0..0x6], [0x1, 0x2, 0x3, 0x4, 0x5, 0x0]);
    }

    #[test]
    fn test_step_advances_pc() {
        let mut state = State::new();
        state.load(&[0x61, 0x22]).unwrap();
        let state = step(&state, &mut MockBus::new()).unwrap();
        assert_eq!(state.v[0x1], 0x22);
        assert_eq!(state.pc, 0x0202);
    }

    #[test]
    fn test_step_call_then_return() {
        let mut state = State::new();
        // 0x200: call 0x204; 0x202: nop; 0x204: ret
        state.load(&[0x22, 0x04, 0x00, 0x00, 0x00, 0xEE]).unwrap();
        let mut bus = MockBus::new();
        let state = step(&state, &mut bus).unwrap();
        assert_eq!(state.pc, 0x0204);
        let state = step(&state, &mut bus).unwrap();
        assert_eq!(state.pc, 0x0202);
        assert_eq!(state.sp, 0x0);
    }

    #[test]
    fn test_step_rejects_invalid_instruction() {
        let mut state = State::new();
        state.load(&[0xFF, 0xFF]).unwrap();
        assert_eq!(
            step(&state, &mut MockBus::new()),
            Err(Fault::InvalidInstruction {
                opcode: Opcode::new(0xFFFF)
            })
        );
    }
}
