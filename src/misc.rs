//! Miscellaneous helpers. The prompt macros are for operator-facing output in
//! the demo binary; library code logs through `log` instead.
//!
//! SPDX-License-Identifier: MIT

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Current wall-clock time formatted for prompt prefixes
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[macro_export]
macro_rules! prompt {
    () => ({
        print!("\x1b[1;35m\u{2726}wirefault\u{2726}\x1b[0m\n");
    });
    ($($arg:tt)*) => ({
        print!("\x1b[1;35m\u{2726}wirefault\u{2726}\x1b[0m [{}] ", $crate::misc::timestamp());
        println!($($arg)*);
    });
}

#[macro_export]
macro_rules! prompt_warn {
    () => ({
        print!("\x1b[1;33m\u{2726}wirefault\u{2726}\x1b[0m\n");
    });
    ($($arg:tt)*) => ({
        print!("\x1b[1;33m\u{2726}wirefault\u{2726}\x1b[0m [{}] ", $crate::misc::timestamp());
        println!($($arg)*);
    });
}

#[macro_export]
macro_rules! fatal {
    ($err:expr) => {
        {
            print!("\n\x1b[1;31mfatal:\x1b[0m ");
            $err.display();
            std::process::exit(-1);
        }
    };
}

/// Lock a mutex, recovering the data if a previous holder panicked. Hook
/// panics are caught and isolated, so a poisoned lock is not fatal here.
pub fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
