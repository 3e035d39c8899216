use lc3vm::io::ScriptedIo;
use lc3vm::{Flag, Reg, Vm};

fn run_image(words: &[u16], input: &[u8]) -> Vm<ScriptedIo> {
    let mut vm = Vm::new(ScriptedIo::new(input.iter().copied()));
    let mut bytes = 0x3000u16.to_be_bytes().to_vec();
    for w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    vm.load_image(&bytes);
    vm.run().expect("well-formed test image should halt cleanly");
    vm
}

#[test]
fn s1_add_immediate_sets_positive_flag() {
    let vm = run_image(&[0x1025, 0xF025], &[]);
    assert_eq!(vm.regs.get(Reg::R0), 5);
    assert_eq!(vm.regs.cond(), Flag::Pos);
}

#[test]
fn s2_add_negative_immediate_sets_negative_flag() {
    let vm = run_image(&[0x103F, 0xF025], &[]);
    assert_eq!(vm.regs.get(Reg::R0), 0xFFFF);
    assert_eq!(vm.regs.cond(), Flag::Neg);
}

#[test]
fn s3_lea_updates_condition_code() {
    let vm = run_image(&[0xE000, 0xF025], &[]);
    assert_eq!(vm.regs.get(Reg::R0), 0x3001);
    assert_eq!(vm.regs.cond(), Flag::Pos);
}

#[test]
fn s4_and_then_add_then_halt_prints_halt_banner() {
    let mut vm = run_image(&[0x5020, 0x1021, 0xF025], &[]);
    assert_eq!(vm.regs.get(Reg::R0), 1);
    assert_eq!(vm.regs.cond(), Flag::Pos);
    assert_eq!(vm.mem.io_mut().output_as_string(), "HALT\n");
}

#[test]
fn s5_puts_then_halt_prints_string_then_banner() {
    let mut vm = run_image(
        &[0xE002, 0xF022, 0xF025, b'H' as u16, b'i' as u16, 0],
        &[],
    );
    assert_eq!(vm.mem.io_mut().output_as_string(), "HiHALT\n");
}

#[test]
fn s6_jsr_and_ret_return_to_caller() {
    let vm = run_image(&[0x4803, 0xF025, 0x0000, 0x0000, 0x1261, 0xC1C0], &[]);
    assert_eq!(vm.regs.get(Reg::R1), 1);
    assert_eq!(vm.regs.get(Reg::R7), 0x3001);
}

#[test]
fn getc_reads_from_the_console_adapter() {
    // TRAP GETC then TRAP HALT
    let vm = run_image(&[0xF020, 0xF025], b"Q");
    assert_eq!(vm.regs.get(Reg::R0), b'Q' as u16);
    assert_eq!(vm.regs.cond(), Flag::Pos);
}

#[test]
fn putsp_emits_packed_characters_in_low_then_high_order() {
    // LEA R0, #2 ; TRAP PUTSP ; TRAP HALT ; .FILL 0x6241 ("Ab") ; .FILL 0x0063 ("c") ; 0
    let vm = run_image(&[0xE002, 0xF024, 0xF025, 0x6241, 0x0063, 0x0000], &[]);
    assert_eq!(vm.mem.io_mut().output_as_string(), "AbcHALT\n");
}

#[test]
fn cond_is_always_one_hot_after_every_flag_update() {
    for words in [
        vec![0x1025u16, 0xF025], // positive
        vec![0x103F, 0xF025],    // negative
        vec![0x5020, 0xF025],    // zero
    ] {
        let vm = run_image(&words, &[]);
        let one_hot_count = [Flag::Neg, Flag::Zero, Flag::Pos]
            .into_iter()
            .filter(|f| *f == vm.regs.cond())
            .count();
        assert_eq!(one_hot_count, 1);
    }
}

#[test]
fn illegal_opcode_aborts_the_run() {
    let mut vm = Vm::new(ScriptedIo::new([]));
    let mut bytes = 0x3000u16.to_be_bytes().to_vec();
    bytes.extend_from_slice(&0x8000u16.to_be_bytes()); // RTI
    vm.load_image(&bytes);
    assert!(vm.run().is_err());
}
