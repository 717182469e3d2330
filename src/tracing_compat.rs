//! Optional tracing integration.
//!
//! With the `tracing-integration` feature the `tracing` macros are
//! re-exported unchanged. Without it, `debug!`, `info!` and `warn!` accept
//! the same field syntax and only borrow their values, so call sites never
//! need their own `#[cfg]` and nothing they log goes unused.

#[cfg(feature = "tracing-integration")]
pub(crate) use tracing::{debug, info, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// Borrow every field value and message argument of a tracing-style
    /// event, then drop them.
    macro_rules! noop_event {
        () => {};
        ($key:ident = % $value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
        ($key:ident = ? $value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
        ($key:ident = $value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
        (% $value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
        (? $value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
        ($value:expr $(, $($rest:tt)*)?) => {{
            let _ = &$value;
            $($crate::tracing_compat::noop_event!($($rest)*);)?
        }};
    }

    macro_rules! noop_debug {
        ($($arg:tt)*) => {
            $crate::tracing_compat::noop_event!($($arg)*)
        };
    }

    macro_rules! noop_info {
        ($($arg:tt)*) => {
            $crate::tracing_compat::noop_event!($($arg)*)
        };
    }

    macro_rules! noop_warn {
        ($($arg:tt)*) => {
            $crate::tracing_compat::noop_event!($($arg)*)
        };
    }

    pub(crate) use {noop_debug, noop_event, noop_info, noop_warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::noop_event;
#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{noop_debug as debug, noop_info as info, noop_warn as warn};
