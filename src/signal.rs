//! Ctrl-C handling for the interactive binaries.
//!
//! The handler only sets a flag. The display loop polls it and shuts the
//! pipeline down from its own thread.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes SIGINT to the interrupt flag. Fails if the handler could not be
/// installed.
pub fn install_interrupt_handler() -> std::io::Result<()> {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Whether SIGINT arrived since the last [`clear_interrupt`].
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Forgets an earlier interrupt.
pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_sigint_sets_the_flag() {
        install_interrupt_handler().unwrap();
        clear_interrupt();
        assert!(!interrupted());

        // SAFETY: raising a signal we just installed a handler for
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert!(interrupted());

        clear_interrupt();
        assert!(!interrupted());
    }
}
