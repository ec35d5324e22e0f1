// crates/pipeline-gate-supervisor/src/clock.rs
// ============================================================================
// Module: System Clock
// Description: Wall-clock implementation of the core Clock capability.
// Purpose: Supply timestamps to hosts that run in real time.
// Dependencies: pipeline-gate-core, time
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time; hosts inject a [`Clock`]. This is
//! the real-time implementation. Tests inject fixed clocks instead so that
//! sealing and replay stay deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pipeline_gate_core::Clock;
use pipeline_gate_core::Timestamp;
use time::OffsetDateTime;

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// Wall-clock [`Clock`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(OffsetDateTime::now_utc())
    }
}
