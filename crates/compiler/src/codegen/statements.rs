//! Statement code generation

use super::runtime::{PRINT_BOOL, PRINT_CHAR, PRINT_INT};
use super::{CodeGen, CodeGenError};
use crate::ast::{AssignTarget, Exp, Stmt, ValueKind};

impl CodeGen {
    pub(super) fn codegen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match stmt {
            Stmt::Seq(statements) => {
                for statement in statements {
                    self.codegen_stmt(statement)?;
                }
                Ok(())
            }
            Stmt::Assign { target, value } => self.codegen_assign(target, value),
            Stmt::Println(expression) => self.codegen_println(expression),
            Stmt::Return(expression) => self.codegen_return(expression),
            Stmt::If { condition, body } => self.codegen_if(condition, body),
            Stmt::AppendToList => Err(CodeGenError::Logic(
                "append statements are not implemented".to_string(),
            )),
        }
    }

    fn codegen_assign(&mut self, target: &AssignTarget, value: &Exp) -> Result<(), CodeGenError> {
        let value = self.codegen_exp(value)?;
        match target {
            AssignTarget::Discard => {
                match &value.kind {
                    ValueKind::Empty => {}
                    ValueKind::List { len, .. } => {
                        for _ in 0..*len {
                            self.emit("pop rax");
                            self.depth -= 1;
                        }
                    }
                    _ => {
                        self.emit("pop rax");
                        self.depth -= 1;
                    }
                }
                Ok(())
            }
            AssignTarget::Name(name) => match value.kind {
                ValueKind::Empty => Err(CodeGenError::Logic(format!(
                    "cannot assign an empty value to '{}'",
                    name
                ))),
                ValueKind::List { .. } => {
                    // The slots are already in place; the binding records
                    // where the list begins.
                    self.contexts.record_binding(name, self.depth, value.kind);
                    Ok(())
                }
                ValueKind::Function(_) => {
                    let Some(info) = value.proc else {
                        return Err(CodeGenError::Logic(format!(
                            "function value assigned to '{}' has no procedure",
                            name
                        )));
                    };
                    self.emit("pop rax");
                    self.depth -= 1;
                    self.contexts.proc_insert(name, info);
                    Ok(())
                }
                _ => {
                    self.emit("pop rax");
                    self.depth -= 1;
                    let (ops, delta) =
                        self.contexts
                            .stack_insert(name, "rax", self.depth, value.kind);
                    for op in ops {
                        self.emit(op);
                    }
                    self.depth += delta;
                    Ok(())
                }
            },
        }
    }

    /// The helper is selected by the compile-time kind of the expression;
    /// a kind without a printable runtime shape refuses to compile.
    fn codegen_println(&mut self, expression: &Exp) -> Result<(), CodeGenError> {
        let value = self.codegen_exp(expression)?;
        let helper = match value.kind {
            ValueKind::Number => PRINT_INT,
            ValueKind::Boolean => PRINT_BOOL,
            ValueKind::Character => PRINT_CHAR,
            other => {
                return Err(CodeGenError::Logic(format!(
                    "println cannot print a value of kind {}",
                    other
                )));
            }
        };
        self.emit(format!("call {}", helper));
        self.depth -= 1;
        Ok(())
    }

    /// `return` unwinds the locals of the current procedure activation
    /// and leaves the result in `rax`. The emitted pops are specific to
    /// the return path, so the tracked depth is left untouched for the
    /// code that follows.
    fn codegen_return(&mut self, expression: &Exp) -> Result<(), CodeGenError> {
        let (entry_depth, arity, return_kind) = match self.contexts.top_procedure() {
            Some(procedure) => (
                procedure.entry_depth,
                procedure.arity,
                procedure.return_kind.clone(),
            ),
            None => {
                return Err(CodeGenError::Logic(
                    "return outside of a function".to_string(),
                ));
            }
        };
        if return_kind == ValueKind::Empty {
            return Err(CodeGenError::Logic(
                "cannot return a value from a function without a return type".to_string(),
            ));
        }

        let value = self.codegen_exp(expression)?;
        if value.kind != return_kind {
            return Err(CodeGenError::Logic(format!(
                "cannot return a value of kind {} from a function returning {}",
                value.kind, return_kind
            )));
        }

        self.emit("pop rax");
        self.depth -= 1;

        for _ in entry_depth..self.depth {
            self.emit("pop rbx");
        }
        if arity == 0 {
            self.emit("ret");
        } else {
            self.emit(format!("ret {}", arity * 8));
        }
        Ok(())
    }

    fn codegen_if(&mut self, condition: &Exp, body: &Stmt) -> Result<(), CodeGenError> {
        let value = self.codegen_exp(condition)?;
        if value.kind != ValueKind::Boolean {
            return Err(CodeGenError::Logic(format!(
                "if condition must be a boolean expression, got {}",
                value.kind
            )));
        }

        self.emit("pop rax");
        self.depth -= 1;
        self.emit("test rax, rax");
        let end_label = self.fresh_end_label();
        self.emit(format!("jz {}", end_label));

        let (frame, prelude, delta) = self.contexts.new_frame(None, self.depth);
        for op in prelude {
            self.emit(op);
        }
        self.depth += delta;
        self.contexts.push(frame);

        self.codegen_stmt(body)?;

        let (pops, _frame) = self.contexts.pop(self.depth);
        for _ in 0..pops {
            self.emit("pop rbx");
        }
        self.depth -= pops;

        self.emit(format!("{}:", end_label));
        Ok(())
    }
}
