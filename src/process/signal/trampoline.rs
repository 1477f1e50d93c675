//! The trampoline pages.
//!
//! Two pages at fixed userspace virtual addresses hold the stubs user code
//! enters the kernel's control flow through: the signal-return stub and the
//! pthread entry stub. They are populated on first use and mapped
//! execute-only thereafter.

use crate::process::mem_space::PAGE_SIZE;
use crate::process::mem_space::PROT_EXEC;
use crate::process::mem_space::PROT_READ;
use crate::process::mem_space::PROT_WRITE;
use crate::process::Process;
use crate::syscall;

/// The fixed address of the signal handler trampoline page.
pub const EVENT_HANDLER_TRAMPOLINE: u32 = 0x8ffe0000;
/// The fixed address of the pthread entry trampoline page.
pub const PTHREAD_ENTRY_TRAMPOLINE: u32 = 0x8ffe1000;

/// The signal trampoline stub.
///
/// On entry, `eax` holds the userspace address of the handler and the signal
/// number is on top of the stack. The stub invokes the handler and traps
/// back through the return-from-signal syscall.
///
/// ```text
/// call *%eax          ; invoke the handler, signal number as argument
/// mov $NR, %eax       ; the sigreturn syscall number
/// int $0x80
/// ```
const SIGRETURN_STUB: [u8; 9] = [
	0xff, 0xd0, // call *%eax
	0xb8,
	syscall::SYS_SIGRETURN as u8,
	0x00, 0x00, 0x00, // mov $SYS_SIGRETURN, %eax
	0xcd, 0x80, // int $0x80
];

/// The pthread entry stub.
///
/// On entry, `eax` holds the thread's start routine and `ebx` its argument.
/// The stub invokes the routine and traps back through `pthread_exit` with
/// its return value.
///
/// ```text
/// push %ebx           ; the start routine's argument
/// call *%eax          ; invoke the start routine
/// push %eax           ; its return value
/// mov $NR, %eax       ; the pthread_exit syscall number
/// int $0x80
/// ```
const PTHREAD_ENTRY_STUB: [u8; 11] = [
	0x53, // push %ebx
	0xff, 0xd0, // call *%eax
	0x50, // push %eax
	0xb8,
	syscall::SYS_PTHREAD_EXIT as u8,
	0x00, 0x00, 0x00, // mov $SYS_PTHREAD_EXIT, %eax
	0xcd, 0x80, // int $0x80
];

/// Installs the trampoline pages in the process's address space if they are
/// not present yet.
pub fn ensure_mapped(proc: &mut Process) {
	if proc.trampolines_mapped {
		return;
	}

	let mut mem_space = proc.mem_space.lock();
	let pairs: [(u32, &[u8]); 2] = [
		(EVENT_HANDLER_TRAMPOLINE, &SIGRETURN_STUB),
		(PTHREAD_ENTRY_TRAMPOLINE, &PTHREAD_ENTRY_STUB),
	];
	for (addr, stub) in pairs {
		let res = mem_space.map(
			Some(addr as usize),
			PAGE_SIZE,
			PROT_READ | PROT_WRITE | PROT_EXEC,
			None,
		);
		if res.is_err() {
			// Already mapped by a previous image
			continue;
		}
		let _ = mem_space.copy_to(addr as usize, stub);
		let _ = mem_space.protect(addr as usize, PAGE_SIZE, PROT_EXEC);
	}
	drop(mem_space);

	proc.trampolines_mapped = true;
}
