//! The non-blocking subscription engine.
//!
//! One subscription per downstream subscriber: it lazily acquires a
//! connection on first demand, executes the rendered statement, and relays
//! result rows or row counts downstream under the demand counter. Everything
//! in here is safe under signals arriving from arbitrary threads.

mod connect;
mod forward;
mod result;
mod subscription;

pub use subscription::{RecordPublisher, RowCountPublisher};
