//! Crate-internal logging macros.
//!
//! Every event goes through these so that building with
//! `--no-default-features` compiles logging out entirely.

macro_rules! vm_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
    };
}

macro_rules! vm_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)*);
    };
}

macro_rules! vm_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)*);
    };
}

pub(crate) use {vm_debug, vm_trace, vm_warn};
