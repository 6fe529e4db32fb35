//! Whole-program assembly
//!
//! Emission order: the `.text` header and `_start`, the main stream, the
//! graceful exit syscall, the printing helpers, then every procedure in
//! creation order.

use super::{CodeGen, CodeGenError, runtime};
use crate::ast::Stmt;
use std::fmt::Write as _;

impl CodeGen {
    /// Compile a parsed program into NASM-syntax x86-64 assembly.
    pub fn codegen_program(&mut self, program: &Stmt) -> Result<String, CodeGenError> {
        let Stmt::Seq(statements) = program else {
            return Err(CodeGenError::Logic(
                "program must be a sequence of statements".to_string(),
            ));
        };
        if statements.is_empty() {
            return Err(CodeGenError::Logic("program has no statements".to_string()));
        }

        self.codegen_stmt(program)?;

        let mut out = String::new();
        writeln!(out, "section .text")?;
        writeln!(out, "global _start")?;
        writeln!(out)?;
        writeln!(out, "_start:")?;
        for op in &self.main {
            write_op(&mut out, op)?;
        }
        writeln!(out, "    mov rax, 60")?;
        writeln!(out, "    xor rdi, rdi")?;
        writeln!(out, "    syscall")?;
        writeln!(out)?;
        out.push_str(runtime::PRINT_HELPERS);

        self.finished.sort_by_key(|p| p.index);
        for procedure in &self.finished {
            writeln!(out)?;
            for op in &procedure.ops {
                write_op(&mut out, op)?;
            }
        }

        Ok(out)
    }
}

fn write_op(out: &mut String, op: &str) -> std::fmt::Result {
    if op.ends_with(':') {
        writeln!(out, "{}", op)
    } else {
        writeln!(out, "    {}", op)
    }
}
