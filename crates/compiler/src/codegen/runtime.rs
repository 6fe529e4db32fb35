//! Embedded runtime helpers
//!
//! Every emitted program carries three printing routines. Each takes its
//! argument in the stack slot above the return address and consumes it
//! with `ret 8`. They save `rcx` around the `syscall` instruction, which
//! clobbers it, because `rcx` carries the capture base of the enclosing
//! procedure activation.

/// `print_int` prints a signed 64-bit integer followed by a newline,
/// `print_bool` prints `0` or `1` followed by a newline, and `print_char`
/// prints a single byte.
pub const PRINT_HELPERS: &str = "\
print_int:
    push rcx
    mov rax, [rsp+16]
    sub rsp, 40
    lea rsi, [rsp+39]
    mov byte [rsi], 10
    mov rcx, 1
    mov rdi, 0
    cmp rax, 0
    jge .digits
    mov rdi, 1
    neg rax
.digits:
    mov rbx, 10
.next:
    xor rdx, rdx
    div rbx
    add dl, '0'
    dec rsi
    mov [rsi], dl
    inc rcx
    test rax, rax
    jnz .next
    cmp rdi, 0
    je .write
    dec rsi
    mov byte [rsi], '-'
    inc rcx
.write:
    mov rdx, rcx
    mov rax, 1
    mov rdi, 1
    syscall
    add rsp, 40
    pop rcx
    ret 8

print_bool:
    push rcx
    mov rax, [rsp+16]
    sub rsp, 8
    add al, '0'
    mov [rsp], al
    mov byte [rsp+1], 10
    mov rax, 1
    mov rdi, 1
    mov rsi, rsp
    mov rdx, 2
    syscall
    add rsp, 8
    pop rcx
    ret 8

print_char:
    push rcx
    mov rax, [rsp+16]
    sub rsp, 8
    mov [rsp], al
    mov rax, 1
    mov rdi, 1
    mov rsi, rsp
    mov rdx, 1
    syscall
    add rsp, 8
    pop rcx
    ret 8
";

/// Helper label for printing a value of the given runtime shape.
pub const PRINT_INT: &str = "print_int";
pub const PRINT_BOOL: &str = "print_bool";
pub const PRINT_CHAR: &str = "print_char";
