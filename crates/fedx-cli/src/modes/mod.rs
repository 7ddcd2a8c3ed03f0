//! Runtime execution modes.
//!
//! - `exec`: one prompt, streamed to stdout/stderr
//! - `chat`: line-oriented interactive session
//! - `render`: event renderer shared by both

pub mod chat;
pub mod exec;
pub mod render;

use std::io::Write;

use fedx_core::core::federation::Federation;
use fedx_core::core::state::Intention;

/// Prints results that finished without the master collecting them.
///
/// Drains the completion queue, so each result is printed once.
pub fn print_uncollected_results(federation: &Federation) {
    let completed = federation.state().drain_completed();
    if completed.is_empty() {
        return;
    }
    let mut out = std::io::stdout();
    for worker in completed {
        let note = match &worker.intention {
            Some(Intention::PassToAgent { target, .. }) => format!(" (forwarded to {target})"),
            Some(Intention::ReviewByMaster) => " (not reviewed)".to_string(),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "\n--- {} ({}){note} ---\n{}",
            worker.id,
            worker.worker_type,
            worker.result.as_deref().unwrap_or("")
        );
    }
    let _ = out.flush();
}
