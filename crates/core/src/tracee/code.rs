//! Machine code the controller injects on its own behalf (x86-64).

/// `int3`, appended after every injected buffer so control returns to us.
pub const TRAP: [u8; 1] = [0xcc];

/// Encodes a `munmap(start, length)` system call.
///
/// The result lands in `rax`: zero on success, `-errno` on failure.
///
/// ```text
/// movabs rdi, start
/// movabs rsi, length
/// mov    eax, SYS_munmap
/// syscall
/// ```
pub fn munmap(start: u64, length: u64) -> Vec<u8> {
    let mut code = Vec::with_capacity(27);
    code.extend_from_slice(&[0x48, 0xbf]);
    code.extend_from_slice(&start.to_le_bytes());
    code.extend_from_slice(&[0x48, 0xbe]);
    code.extend_from_slice(&length.to_le_bytes());
    code.push(0xb8);
    code.extend_from_slice(&(libc::SYS_munmap as u32).to_le_bytes());
    code.extend_from_slice(&[0x0f, 0x05]);
    code
}
