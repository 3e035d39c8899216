//! The fetch-decode-execute loop, the sixteen-way opcode dispatch, and the
//! trap service routines.

use std::fmt;

use log::{debug, trace};

use crate::bits::{field, sign_extend};
use crate::io::ConsoleIo;
use crate::loader::load_image;
use crate::memory::Memory;
use crate::registers::{Flag, Reg, Registers};

/// The sixteen LC-3 opcodes. `Rti` and `Res` are kept as variants (rather
/// than left out of the enum) so the opcode match in `Vm::execute` stays
/// exhaustive and the compiler enforces that every opcode is handled one
/// way or another, even though both are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Br,
    Add,
    Ld,
    St,
    Jsr,
    And,
    Ldr,
    Str,
    Rti,
    Not,
    Ldi,
    Sti,
    Jmp,
    Res,
    Lea,
    Trap,
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value & 0xF {
            0x0 => Opcode::Br,
            0x1 => Opcode::Add,
            0x2 => Opcode::Ld,
            0x3 => Opcode::St,
            0x4 => Opcode::Jsr,
            0x5 => Opcode::And,
            0x6 => Opcode::Ldr,
            0x7 => Opcode::Str,
            0x8 => Opcode::Rti,
            0x9 => Opcode::Not,
            0xA => Opcode::Ldi,
            0xB => Opcode::Sti,
            0xC => Opcode::Jmp,
            0xD => Opcode::Res,
            0xE => Opcode::Lea,
            0xF => Opcode::Trap,
            other => return Err(other),
        })
    }
}

/// Trap vectors, §4.7.
mod trap_vector {
    pub const GETC: u8 = 0x20;
    pub const OUT: u8 = 0x21;
    pub const PUTS: u8 = 0x22;
    pub const IN: u8 = 0x23;
    pub const PUTSP: u8 = 0x24;
    pub const HALT: u8 = 0x25;
}

/// A fault that stops the executor: an illegal opcode (`RTI`/`RES`).
/// There is no recovery path — an LC-3 program cannot catch this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmFault {
    IllegalOpcode(u16),
}

impl fmt::Display for VmFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmFault::IllegalOpcode(instr) => {
                write!(f, "illegal opcode in instruction {instr:#06x}")
            }
        }
    }
}

impl std::error::Error for VmFault {}

/// The machine: register file, memory, and the running/halted flag.
pub struct Vm<IO: ConsoleIo> {
    pub regs: Registers,
    pub mem: Memory<IO>,
    running: bool,
}

impl<IO: ConsoleIo> Vm<IO> {
    /// Build a fresh machine: `PC = 0x3000`, `COND = Z`, memory zeroed.
    pub fn new(io: IO) -> Self {
        Vm {
            regs: Registers::new(),
            mem: Memory::new(io),
            running: false,
        }
    }

    /// Load one object image. May be called more than once, once per
    /// `<image-file>` argument; later images overwrite earlier ones where
    /// they overlap. Returns the origin the image was loaded at.
    pub fn load_image(&mut self, bytes: &[u8]) -> u16 {
        load_image(bytes, &mut self.mem)
    }

    /// Run until TRAP HALT or a fatal fault.
    pub fn run(&mut self) -> Result<(), VmFault> {
        self.running = true;
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Fetch, decode, and execute exactly one instruction. Returns `true`
    /// once the machine has halted (so a host driver can run this in a
    /// loop and check for external interruption between instructions,
    /// rather than only ever calling the all-in-one `run`).
    pub fn step_once(&mut self) -> Result<bool, VmFault> {
        if !self.running {
            self.running = true;
        }
        self.step()?;
        Ok(!self.running)
    }

    /// Fetch, decode, and execute exactly one instruction.
    fn step(&mut self) -> Result<(), VmFault> {
        let pc = self.regs.pc();
        let instr = self.mem.read(pc);
        self.regs.set_pc(pc.wrapping_add(1));
        trace!("fetch pc={pc:#06x} instr={instr:#06x}");
        let opcode = Opcode::try_from(instr >> 12).unwrap();
        self.execute(opcode, instr)
    }

    fn execute(&mut self, opcode: Opcode, instr: u16) -> Result<(), VmFault> {
        match opcode {
            Opcode::Add => self.add(instr),
            Opcode::And => self.and(instr),
            Opcode::Not => self.not(instr),
            Opcode::Br => self.br(instr),
            Opcode::Jmp => self.jmp(instr),
            Opcode::Jsr => self.jsr(instr),
            Opcode::Ld => self.ld(instr),
            Opcode::Ldi => self.ldi(instr),
            Opcode::Ldr => self.ldr(instr),
            Opcode::Lea => self.lea(instr),
            Opcode::St => self.st(instr),
            Opcode::Sti => self.sti(instr),
            Opcode::Str => self.str_(instr),
            Opcode::Trap => self.trap(instr),
            Opcode::Rti | Opcode::Res => return Err(VmFault::IllegalOpcode(instr)),
        }
        Ok(())
    }

    fn add(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let sr1 = Reg::try_from(field(instr, 6, 3)).unwrap();
        let rhs = if field(instr, 5, 1) != 0 {
            sign_extend(field(instr, 0, 5), 5)
        } else {
            let sr2 = Reg::try_from(field(instr, 0, 3)).unwrap();
            self.regs.get(sr2)
        };
        self.regs
            .set(dr, self.regs.get(sr1).wrapping_add(rhs));
        self.regs.update_flags(dr);
    }

    fn and(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let sr1 = Reg::try_from(field(instr, 6, 3)).unwrap();
        let rhs = if field(instr, 5, 1) != 0 {
            sign_extend(field(instr, 0, 5), 5)
        } else {
            let sr2 = Reg::try_from(field(instr, 0, 3)).unwrap();
            self.regs.get(sr2)
        };
        self.regs.set(dr, self.regs.get(sr1) & rhs);
        self.regs.update_flags(dr);
    }

    fn not(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let sr = Reg::try_from(field(instr, 6, 3)).unwrap();
        self.regs.set(dr, !self.regs.get(sr));
        self.regs.update_flags(dr);
    }

    fn br(&mut self, instr: u16) {
        let nzp = field(instr, 9, 3);
        let cond_bit = match self.regs.cond() {
            Flag::Neg => 0b100,
            Flag::Zero => 0b010,
            Flag::Pos => 0b001,
        };
        if nzp & cond_bit != 0 {
            let offset = sign_extend(field(instr, 0, 9), 9);
            self.regs.set_pc(self.regs.pc().wrapping_add(offset));
        }
    }

    fn jmp(&mut self, instr: u16) {
        let base = Reg::try_from(field(instr, 6, 3)).unwrap();
        self.regs.set_pc(self.regs.get(base));
    }

    fn jsr(&mut self, instr: u16) {
        self.regs.set(Reg::R7, self.regs.pc());
        if field(instr, 11, 1) != 0 {
            let offset = sign_extend(field(instr, 0, 11), 11);
            self.regs.set_pc(self.regs.pc().wrapping_add(offset));
        } else {
            let base = Reg::try_from(field(instr, 6, 3)).unwrap();
            self.regs.set_pc(self.regs.get(base));
        }
    }

    fn ld(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 9), 9);
        let addr = self.regs.pc().wrapping_add(offset);
        let value = self.mem.read(addr);
        self.regs.set(dr, value);
        self.regs.update_flags(dr);
    }

    fn ldi(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 9), 9);
        let ptr = self.regs.pc().wrapping_add(offset);
        let addr = self.mem.read(ptr);
        let value = self.mem.read(addr);
        self.regs.set(dr, value);
        self.regs.update_flags(dr);
    }

    fn ldr(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let base = Reg::try_from(field(instr, 6, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 6), 6);
        let addr = self.regs.get(base).wrapping_add(offset);
        let value = self.mem.read(addr);
        self.regs.set(dr, value);
        self.regs.update_flags(dr);
    }

    fn lea(&mut self, instr: u16) {
        let dr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 9), 9);
        self.regs.set(dr, self.regs.pc().wrapping_add(offset));
        self.regs.update_flags(dr);
    }

    fn st(&mut self, instr: u16) {
        let sr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 9), 9);
        let addr = self.regs.pc().wrapping_add(offset);
        self.mem.write(addr, self.regs.get(sr));
    }

    fn sti(&mut self, instr: u16) {
        let sr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 9), 9);
        let ptr = self.regs.pc().wrapping_add(offset);
        let addr = self.mem.read(ptr);
        self.mem.write(addr, self.regs.get(sr));
    }

    fn str_(&mut self, instr: u16) {
        let sr = Reg::try_from(field(instr, 9, 3)).unwrap();
        let base = Reg::try_from(field(instr, 6, 3)).unwrap();
        let offset = sign_extend(field(instr, 0, 6), 6);
        let addr = self.regs.get(base).wrapping_add(offset);
        self.mem.write(addr, self.regs.get(sr));
    }

    fn trap(&mut self, instr: u16) {
        self.regs.set(Reg::R7, self.regs.pc());
        let vector = field(instr, 0, 8) as u8;
        debug!("trap vector={vector:#04x}");
        match vector {
            trap_vector::GETC => {
                let byte = self.mem.io_mut().read_char();
                self.regs.set(Reg::R0, byte as u16);
                self.regs.update_flags(Reg::R0);
            }
            trap_vector::OUT => {
                let byte = (self.regs.get(Reg::R0) & 0xFF) as u8;
                self.mem.io_mut().write_char(byte);
                self.mem.io_mut().flush_output();
            }
            trap_vector::PUTS => {
                let mut addr = self.regs.get(Reg::R0);
                loop {
                    let word = self.mem.read(addr);
                    if word == 0 {
                        break;
                    }
                    self.mem.io_mut().write_char((word & 0xFF) as u8);
                    addr = addr.wrapping_add(1);
                }
                self.mem.io_mut().flush_output();
            }
            trap_vector::IN => {
                for byte in b"Enter a character: " {
                    self.mem.io_mut().write_char(*byte);
                }
                self.mem.io_mut().flush_output();
                let byte = self.mem.io_mut().read_char();
                self.mem.io_mut().write_char(byte);
                self.mem.io_mut().flush_output();
                self.regs.set(Reg::R0, byte as u16);
                self.regs.update_flags(Reg::R0);
            }
            trap_vector::PUTSP => {
                let mut addr = self.regs.get(Reg::R0);
                loop {
                    let word = self.mem.read(addr);
                    if word == 0 {
                        break;
                    }
                    let lo = (word & 0xFF) as u8;
                    let hi = (word >> 8) as u8;
                    self.mem.io_mut().write_char(lo);
                    if hi != 0 {
                        self.mem.io_mut().write_char(hi);
                    }
                    addr = addr.wrapping_add(1);
                }
                self.mem.io_mut().flush_output();
            }
            trap_vector::HALT => {
                for byte in b"HALT\n" {
                    self.mem.io_mut().write_char(*byte);
                }
                self.mem.io_mut().flush_output();
                self.running = false;
            }
            _ => {
                // Unknown trap vectors are a no-op, matching the reference
                // implementation's switch, which has no default arm here.
            }
        }
    }
}
