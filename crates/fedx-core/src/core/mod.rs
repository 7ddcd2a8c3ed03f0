//! Core module: UI-agnostic federation runtime.
//!
//! This module contains:
//! - `events`: Federation event types and payloads
//! - `bus`: Synchronous publish/subscribe event bus
//! - `state`: Worker records, templates and the completion queue
//! - `turn`: Accumulation of streamed assistant turns
//! - `master`: Master control loop
//! - `dispatch`: Master-side operation table
//! - `worker`: Worker runner (one task per delegation)
//! - `federation`: Explicit wiring of the above

pub mod bus;
pub mod dispatch;
pub mod events;
pub mod federation;
pub mod master;
pub mod state;
pub mod turn;
pub mod worker;
