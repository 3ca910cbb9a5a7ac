//! # Logging
//!
//! Thin wrappers over `defmt`. On the firmware target every macro forwards
//! to the matching `defmt` macro (transported over RTT). On the host the
//! arguments are still evaluated by reference, so unit tests build without
//! a global logger and without unused-variable noise.

#![allow(unused_macros)]

macro_rules! log_impl {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::$level!($fmt $(, $arg)*);
        #[cfg(not(target_os = "none"))]
        {
            $( let _ = &$arg; )*
        }
    }};
}

macro_rules! debug {
    ($($t:tt)*) => { log_impl!(debug, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { log_impl!(info, $($t)*) };
}

macro_rules! warn {
    ($($t:tt)*) => { log_impl!(warn, $($t)*) };
}

macro_rules! error {
    ($($t:tt)*) => { log_impl!(error, $($t)*) };
}
