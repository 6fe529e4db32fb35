//! End-to-end compilation tests
//!
//! These drive the whole pipeline through the public API and assert on
//! the emitted assembly. Assembling and linking need external tools and
//! are exercised by the driver, not here.

use callmec::{CompilerConfig, compile_to_asm, emit_asm_file};

#[test]
fn test_print_constant() {
    let asm = compile_to_asm("x = 1 println x").unwrap();
    assert!(asm.starts_with("section .text"));
    assert!(asm.contains("global _start"));
    assert!(asm.contains("push 1"));
    assert!(asm.contains("call print_int"));
    // Graceful exit comes before the helpers.
    let exit = asm.find("mov rax, 60").unwrap();
    let helpers = asm.find("print_int:").unwrap();
    assert!(exit < helpers);
}

#[test]
fn test_print_sum() {
    let asm = compile_to_asm("x = 3 + 4 println x").unwrap();
    assert!(asm.contains("add rax, rbx"));
    assert!(asm.contains("call print_int"));
}

#[test]
fn test_print_product() {
    let asm = compile_to_asm("x = 3 * 5 println x").unwrap();
    assert!(asm.contains("imul rax, rbx"));
}

#[test]
fn test_print_grouped_product() {
    let asm = compile_to_asm("x = (2 + 2) * 3 println x").unwrap();
    let add = asm.find("add rax, rbx").unwrap();
    let mul = asm.find("imul rax, rbx").unwrap();
    assert!(add < mul);
}

#[test]
fn test_if_equality() {
    let asm = compile_to_asm("if 1 == 1 { println 42 }").unwrap();
    assert!(asm.contains("sete al"));
    assert!(asm.contains("jz .Lend_1"));
    assert!(asm.contains("push 42"));
}

#[test]
fn test_recursive_sum() {
    let source = "f = <me, n: int> -> int { if n == 0 { return 0 } return n + call me with n - 1 } println call f with 5";
    let asm = compile_to_asm(source).unwrap();
    assert!(asm.contains("proc1:"));
    assert_eq!(asm.matches("call proc1").count(), 2);
    // The callee consumes its single argument slot.
    assert!(asm.contains("ret 8"));
}

#[test]
fn test_closure_reads_captured_value() {
    let source = "x = 5 f = <me> -> int { return x } println call f with";
    let asm = compile_to_asm(source).unwrap();
    // The capture is addressed through the saved base, not the plain
    // stack pointer.
    assert!(asm.contains("[rsp+rcx+8+8]"));
    assert!(asm.contains("call print_int"));
}

#[test]
fn test_capture_is_copied_at_creation() {
    // The closure sees the value at construction time: the capture
    // prelude copies the slot before the reassignment writes through.
    let source = "x = 5 f = <me> -> int { return x } x = 6 println call f with";
    let asm = compile_to_asm(source).unwrap();
    let capture_copy = asm.find("mov rax, [rsp+0]").unwrap();
    // The reassignment reaches only the original slot, one capture copy
    // above it; the closure's block keeps the constructed value.
    let write_through = asm.find("mov [rsp+8], rax").unwrap();
    assert!(capture_copy < write_through);
}

#[test]
fn test_list_round_trip_shape() {
    let asm = compile_to_asm("xs = [7, 8, 9] : int : 4 println get 2 from xs").unwrap();
    assert_eq!(asm.matches("push 0").count(), 4);
    assert!(asm.contains("mov rax, [rax+rbx*8]"));
}

#[test]
fn test_negative_unknown_identifier() {
    assert!(compile_to_asm("println undefined_name").is_err());
}

#[test]
fn test_negative_boolean_arithmetic() {
    assert!(compile_to_asm("x = true + 1").is_err());
}

#[test]
fn test_negative_top_level_return() {
    assert!(compile_to_asm("return 1").is_err());
}

#[test]
fn test_negative_residue_after_program() {
    let err = compile_to_asm("f = <me, n: int> -> int { return n } call f").unwrap_err();
    assert!(err.contains("failed to parse the entire program"));
}

#[test]
fn test_negative_missing_arguments() {
    let err = compile_to_asm("f = <me, n: int> -> int { return n } _ = call f").unwrap_err();
    assert!(err.contains("expects 1 argument(s)"));
}

#[test]
fn test_emit_asm_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("sum.cm");
    let asm_path = dir.path().join("sum.asm");
    std::fs::write(&source_path, "x = 20 + 22 println x").unwrap();

    emit_asm_file(&source_path, &asm_path).unwrap();

    let asm = std::fs::read_to_string(&asm_path).unwrap();
    assert!(asm.contains("global _start"));
    assert!(asm.contains("call print_int"));
}

#[test]
fn test_emit_asm_file_propagates_compile_errors() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("bad.cm");
    let asm_path = dir.path().join("bad.asm");
    std::fs::write(&source_path, "println nope").unwrap();

    let err = emit_asm_file(&source_path, &asm_path).unwrap_err();
    assert!(err.contains("could not resolve 'nope'"));
    assert!(!asm_path.exists());
}

#[test]
fn test_driver_config_defaults() {
    let config = CompilerConfig::default();
    assert_eq!(config.assembler_program(), "nasm");
    assert_eq!(config.linker_program(), "ld");
}

#[test]
fn test_deterministic_output() {
    let source = "a = 1 b = 2 f = <me> -> int { return a + b } println call f with";
    let first = compile_to_asm(source).unwrap();
    let second = compile_to_asm(source).unwrap();
    assert_eq!(first, second);
}
