//! Callme Compiler Library
//!
//! Provides compilation from `.cm` source to NASM-syntax x86-64 assembly
//! and, through an external assembler and linker, to executable binaries.
//!
//! The pipeline is three sequential stages: the tokenizer turns the
//! source text into a lazy stream of classified lexemes, the parser
//! builds a typed AST with one token of lookahead, and the code generator
//! walks the AST once while a stack of lexical scopes tracks where every
//! live binding sits on the runtime stack.
//!
//! ```rust
//! let asm = callmec::compile_to_asm("x = 1 println x").unwrap();
//! assert!(asm.contains("_start:"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod parser;
pub mod tokenizer;

pub use codegen::{CodeGen, CodeGenError};
pub use config::CompilerConfig;
pub use parser::Parser;
pub use tokenizer::{Token, TokenKind, Tokenizer};

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Minimum nasm major version required; `-f elf64` needs nothing newer,
/// but ancient 0.98-era installs predate the 64-bit output format.
const MIN_NASM_VERSION: u32 = 2;

/// Cache for the assembler probe; it only runs once per process.
static NASM_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

/// Check that the configured assembler is available and recent enough.
fn check_nasm_version(program: &str) -> Result<u32, String> {
    NASM_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new(program).arg("-v").output().map_err(|e| {
                format!(
                    "Failed to run {}: {}. Please install nasm {} or later.",
                    program, e, MIN_NASM_VERSION
                )
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "{} -v failed with exit code {:?}: {}",
                    program,
                    output.status.code(),
                    stderr
                ));
            }

            let version_str = String::from_utf8_lossy(&output.stdout);
            let version = parse_nasm_version(&version_str).ok_or_else(|| {
                format!(
                    "Could not parse assembler version from: {}",
                    version_str.lines().next().unwrap_or(&version_str)
                )
            })?;

            if version < MIN_NASM_VERSION {
                return Err(format!(
                    "nasm version {} detected, but callmec requires {} or later for elf64 output.",
                    version, MIN_NASM_VERSION
                ));
            }

            Ok(version)
        })
        .clone()
}

/// Parse the major version from `nasm -v` output like
/// `NASM version 2.16.01 compiled on Dec 24 2022`.
fn parse_nasm_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if let Some(index) = line.find("version ") {
            let after = &line[index + 8..];
            let major: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !major.is_empty() {
                return major.parse().ok();
            }
        }
    }
    None
}

/// Compile source text to assembly text.
pub fn compile_to_asm(source: &str) -> Result<String, String> {
    let mut parser = Parser::new(source);
    let program = parser.parse()?;

    let mut codegen = CodeGen::new();
    codegen.codegen_program(&program).map_err(|e| e.to_string())
}

/// Compile a `.cm` source file and write the assembly next to the given
/// output path. Returns the path of the written file.
pub fn emit_asm_file(source_path: &Path, asm_path: &Path) -> Result<(), String> {
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("Failed to read source file: {}", e))?;
    let asm = compile_to_asm(&source)?;
    fs::write(asm_path, asm).map_err(|e| format!("Failed to write assembly file: {}", e))
}

/// Compile a `.cm` source file to an executable.
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<(), String> {
    compile_file_with_config(source_path, output_path, &CompilerConfig::default())
}

/// Compile a `.cm` source file to an executable with a custom driver
/// configuration: assemble with nasm, link with ld.
pub fn compile_file_with_config(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    let asm_path = output_path.with_extension("asm");
    emit_asm_file(source_path, &asm_path)?;

    check_nasm_version(config.assembler_program())?;

    let object_path = output_path.with_extension("o");
    let output = Command::new(config.assembler_program())
        .args(["-f", "elf64"])
        .arg(&asm_path)
        .arg("-o")
        .arg(&object_path)
        .output()
        .map_err(|e| format!("Failed to run {}: {}", config.assembler_program(), e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Assembling failed:\n{}", stderr));
    }

    let output = Command::new(config.linker_program())
        .arg(&object_path)
        .arg("-o")
        .arg(output_path)
        .args(&config.linker_args)
        .output()
        .map_err(|e| format!("Failed to run {}: {}", config.linker_program(), e))?;

    fs::remove_file(&object_path).ok();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Linking failed:\n{}", stderr));
    }

    if !config.keep_asm {
        fs::remove_file(&asm_path).ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nasm_version_standard() {
        let output = "NASM version 2.16.01 compiled on Dec 24 2022";
        assert_eq!(parse_nasm_version(output), Some(2));
    }

    #[test]
    fn test_parse_nasm_version_plain() {
        assert_eq!(parse_nasm_version("NASM version 3.00"), Some(3));
    }

    #[test]
    fn test_parse_nasm_version_invalid() {
        assert_eq!(parse_nasm_version("no version here"), None);
        assert_eq!(parse_nasm_version("version "), None);
    }

    #[test]
    fn test_compile_to_asm_smoke() {
        let asm = compile_to_asm("x = 2 + 3 println x").unwrap();
        assert!(asm.contains("global _start"));
        assert!(asm.contains("call print_int"));
    }

    #[test]
    fn test_compile_to_asm_reports_parse_errors() {
        let err = compile_to_asm("x = ").unwrap_err();
        assert!(err.contains("failed to parse"));
    }
}
