//! Debug assertion macros for coordinator invariants.
//!
//! These macros are only active in debug builds (`#[cfg(debug_assertions)]`),
//! so there is zero overhead in release builds.

// =============================================================================
// Single Invocation In Flight
// =============================================================================

/// Assert that no other producer invocation holds the producer.
///
/// **Invariant**: `dispatch ∨ restore → no other body running`
///
/// Used in: `Coordinator::begin_cycle()` (the idle producer slot must be
/// filled) and `Coordinator::restore()` (the slot must still be empty)
macro_rules! debug_assert_single_in_flight {
    ($other_running:expr) => {
        debug_assert!(
            !$other_running,
            "producer invoked while another invocation is in flight"
        )
    };
}

// =============================================================================
// Ended Is Monotonic
// =============================================================================

/// Assert that the ended flag never reverts.
///
/// **Invariant**: `ended(before) → ended(after)`
///
/// Used in: `Coordinator::settle_one()` when returning to `Idle`
macro_rules! debug_assert_not_reopened {
    ($was_ended:expr, $is_ended:expr) => {
        debug_assert!(
            !$was_ended || $is_ended,
            "stream reopened after the end-marker was observed"
        )
    };
}

// =============================================================================
// No Fetch After End
// =============================================================================

/// Assert that a settling cycle never re-opens fetching after the end.
///
/// **Invariant**: `ended → phase == Ended` (so `settle → Idle` implies `¬ended`)
///
/// Used in: `Coordinator::settle_one()` before returning to `Idle`
macro_rules! debug_assert_no_fetch_after_end {
    ($ended:expr) => {
        debug_assert!(!$ended, "cycle settled back to Idle after the stream ended")
    };
}

// =============================================================================
// Counted Join Never Underflows
// =============================================================================

/// Assert that a settlement has a matching outstanding emission.
///
/// **Invariant**: `settle → pending > 0`
///
/// Used in: `Coordinator::settle_one()`
macro_rules! debug_assert_pending_outstanding {
    ($pending:expr) => {
        debug_assert!(
            $pending > 0,
            "settlement without an outstanding emission (pending == 0)"
        )
    };
}

pub(crate) use debug_assert_no_fetch_after_end;
pub(crate) use debug_assert_not_reopened;
pub(crate) use debug_assert_pending_outstanding;
pub(crate) use debug_assert_single_in_flight;
