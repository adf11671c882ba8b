// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! SIGINT handling for the synchronous conversation foreground.
//!
//! The handler only sets a flag.  It is installed without `SA_RESTART`, so
//! a Ctrl-C makes blocking reads fail with `EINTR` — the terminal reader
//! maps that to [`crate::Signal::Interrupted`], which the orchestrator
//! turns into a cycle restart with the uncommitted history discarded.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the flag-setting SIGINT handler.  Call once at startup.
#[cfg(unix)]
pub fn install_sigint_handler() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigint as usize;
        // No SA_RESTART: interrupted syscalls must return EINTR.
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
pub fn install_sigint_handler() {}

/// Consume a pending interrupt, if any.
pub fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

/// Peek without consuming.
pub fn interrupt_pending() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
