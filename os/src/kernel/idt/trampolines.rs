//! Assembly entry points installed in the IDT.
//!
//! Each stub saves the caller-saved registers, calls its Rust handler with a
//! pointer to the CPU-pushed frame (plus the error code where the vector
//! pushes one) and returns with `iretq`. Callee-saved registers are preserved
//! by the handler itself under the C ABI.

use core::arch::global_asm;

use super::handlers;

global_asm!(
    r#"
    .pushsection .text

    .macro SAVE_SCRATCH
        push rax
        push rcx
        push rdx
        push rsi
        push rdi
        push r8
        push r9
        push r10
        push r11
    .endm

    .macro RESTORE_SCRATCH
        pop r11
        pop r10
        pop r9
        pop r8
        pop rdi
        pop rsi
        pop rdx
        pop rcx
        pop rax
    .endm

    // 40-byte frame leaves rsp = 8 mod 16; nine pushes realign it.
    .macro TRAMPOLINE name, handler
    .global \name
    \name:
        SAVE_SCRATCH
        lea rdi, [rsp + 72]
        cld
        call \handler
        RESTORE_SCRATCH
        iretq
    .endm

    // Error code sits below the frame; 48 bytes + nine pushes need 8 more.
    .macro TRAMPOLINE_ERR name, handler
    .global \name
    \name:
        SAVE_SCRATCH
        sub rsp, 8
        mov rsi, [rsp + 80]
        lea rdi, [rsp + 88]
        cld
        call \handler
        add rsp, 8
        RESTORE_SCRATCH
        add rsp, 8
        iretq
    .endm

    TRAMPOLINE hwinit_isr_divide_error, {divide_error}
    TRAMPOLINE_ERR hwinit_isr_double_fault, {double_fault}
    TRAMPOLINE_ERR hwinit_isr_general_protection, {general_protection}
    TRAMPOLINE hwinit_isr_timer, {timer}
    TRAMPOLINE hwinit_isr_keyboard, {keyboard}

    .popsection
    "#,
    divide_error = sym handlers::divide_error,
    double_fault = sym handlers::double_fault,
    general_protection = sym handlers::general_protection,
    timer = sym handlers::timer,
    keyboard = sym handlers::keyboard,
);

extern "C" {
    pub fn hwinit_isr_divide_error();
    pub fn hwinit_isr_double_fault();
    pub fn hwinit_isr_general_protection();
    pub fn hwinit_isr_timer();
    pub fn hwinit_isr_keyboard();
}
