//! Entry stubs for all 256 vectors.
//!
//! Every stub leaves the stack in the same shape: an error code (pushed by the
//! CPU for the vectors in `ERROR_CODE_VECTORS`, a zero otherwise) and the
//! vector number on top of the CPU's return frame. The common path then saves
//! the remaining registers into a [`CpuState`], hands it to the active
//! interrupt manager and resumes from whatever state comes back.

use core::ptr::{addr_of, NonNull};

use crate::interrupts::frame::CpuState;
use crate::interrupts::idt::VECTOR_COUNT;
use crate::interrupts::manager::dispatch_active;

/// Vectors for which the CPU pushes an error code itself.
pub const ERROR_CODE_VECTORS: [u8; 10] = [8, 10, 11, 12, 13, 14, 17, 21, 29, 30];

#[allow(non_upper_case_globals)]
extern "C" {
    static basalt_isr_stub_table: [u64; VECTOR_COUNT];
}

/// Addresses of the 256 entry stubs, indexed by vector.
pub fn entry_points() -> &'static [u64; VECTOR_COUNT] {
    unsafe { &*addr_of!(basalt_isr_stub_table) }
}

extern "C" fn interrupt_entry(state: *mut CpuState) -> *mut CpuState {
    match NonNull::new(state) {
        Some(state) => dispatch_active(state).as_ptr(),
        None => state,
    }
}

core::arch::global_asm!(
    r".macro basalt_isr_stub n",
    r"basalt_isr_\n:",
    r"    push 0",
    r"    push \n",
    r"    jmp basalt_isr_common",
    r".endm",
    "",
    r".macro basalt_isr_stub_error_code n",
    r"basalt_isr_\n:",
    r"    push \n",
    r"    jmp basalt_isr_common",
    r".endm",
    "",
    r".irp n, 0, 1, 2, 3, 4, 5, 6, 7, 9, 15, 16, 18, 19, 20, 22, 23",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 24, 25, 26, 27, 28, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 74, 75, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99, 100, 101, 102, 103, 104, 105",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118, 119, 120, 121",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 122, 123, 124, 125, 126, 127, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 138, 139, 140, 141, 142, 143, 144, 145, 146, 147, 148, 149, 150, 151, 152, 153",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 154, 155, 156, 157, 158, 159, 160, 161, 162, 163, 164, 165, 166, 167, 168, 169",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 170, 171, 172, 173, 174, 175, 176, 177, 178, 179, 180, 181, 182, 183, 184, 185",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 186, 187, 188, 189, 190, 191, 192, 193, 194, 195, 196, 197, 198, 199, 200, 201",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 202, 203, 204, 205, 206, 207, 208, 209, 210, 211, 212, 213, 214, 215, 216, 217",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 218, 219, 220, 221, 222, 223, 224, 225, 226, 227, 228, 229, 230, 231, 232, 233",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 234, 235, 236, 237, 238, 239, 240, 241, 242, 243, 244, 245, 246, 247, 248, 249",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 250, 251, 252, 253, 254, 255",
    r"    basalt_isr_stub \n",
    ".endr",
    r".irp n, 8, 10, 11, 12, 13, 14, 17, 21, 29, 30",
    r"    basalt_isr_stub_error_code \n",
    ".endr",
    "",
    "basalt_isr_common:",
    "    push r15",
    "    push r14",
    "    push r13",
    "    push r12",
    "    push r11",
    "    push r10",
    "    push r9",
    "    push r8",
    "    push rbp",
    "    push rdi",
    "    push rsi",
    "    push rdx",
    "    push rcx",
    "    push rbx",
    "    push rax",
    "    xor eax, eax",
    "    mov ax, ds",
    "    push rax",
    "    mov ax, es",
    "    push rax",
    "    mov rdi, rsp",
    "    cld",
    "    call {entry}",
    // The dispatcher may hand back another task's state.
    "    mov rsp, rax",
    "    pop rax",
    "    mov es, ax",
    "    pop rax",
    "    mov ds, ax",
    "    pop rax",
    "    pop rbx",
    "    pop rcx",
    "    pop rdx",
    "    pop rsi",
    "    pop rdi",
    "    pop rbp",
    "    pop r8",
    "    pop r9",
    "    pop r10",
    "    pop r11",
    "    pop r12",
    "    pop r13",
    "    pop r14",
    "    pop r15",
    "    add rsp, 16",
    "    iretq",
    "",
    ".pushsection .data",
    ".balign 8",
    ".global basalt_isr_stub_table",
    "basalt_isr_stub_table:",
    r".irp n, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 77, 78, 79",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 96, 97, 98, 99, 100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 112, 113, 114, 115, 116, 117, 118, 119, 120, 121, 122, 123, 124, 125, 126, 127",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137, 138, 139, 140, 141, 142, 143",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 144, 145, 146, 147, 148, 149, 150, 151, 152, 153, 154, 155, 156, 157, 158, 159",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 160, 161, 162, 163, 164, 165, 166, 167, 168, 169, 170, 171, 172, 173, 174, 175",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 176, 177, 178, 179, 180, 181, 182, 183, 184, 185, 186, 187, 188, 189, 190, 191",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 192, 193, 194, 195, 196, 197, 198, 199, 200, 201, 202, 203, 204, 205, 206, 207",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 208, 209, 210, 211, 212, 213, 214, 215, 216, 217, 218, 219, 220, 221, 222, 223",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 234, 235, 236, 237, 238, 239",
    r"    .quad basalt_isr_\n",
    ".endr",
    r".irp n, 240, 241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255",
    r"    .quad basalt_isr_\n",
    ".endr",
    ".popsection",
    entry = sym interrupt_entry,
);
