//! Verbosity-gated logging for the scheduling engine.
//!
//! Output goes to stderr and costs nothing beyond an integer comparison when
//! the configured verbosity is below the macro's level:
//! - 0: SILENT (nothing)
//! - 1: CHANGES (accepted placements, tasks moved by propagation)
//! - 2: CHECKS (per-task anchors, conflicts found, skip reasons)
//! - 3: DEBUG (placement state machine, slice-by-slice allocation)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!("[taskshift] {}", format_args!($($arg)*));
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!("[taskshift]   {}", format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!("[taskshift]     {}", format_args!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(VERBOSITY_SILENT < VERBOSITY_CHANGES);
        assert!(VERBOSITY_CHANGES < VERBOSITY_CHECKS);
        assert!(VERBOSITY_CHECKS < VERBOSITY_DEBUG);
    }

    #[test]
    fn test_silent_macros_do_not_panic() {
        let verbosity = VERBOSITY_SILENT;
        log_changes!(verbosity, "placed {}", "t1");
        log_checks!(verbosity, "anchor {}", 2);
        log_debug!(verbosity, "slice {:?}", (1, 2));
    }
}
