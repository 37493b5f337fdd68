//! Logging facilities for Lattice Projection.
//!
//! Lattice Projection uses the `tracing` crate for instrumentation. To see
//! logs, install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!     // Your application code...
//! }
//! ```
//!
//! Every event is emitted under one of the [`targets`], so a directive such
//! as `lattice_projection::projected=debug` isolates a single subsystem.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Dispatcher and execution context target.
    pub const DISPATCHER: &str = "lattice_projection_core::dispatcher";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "lattice_projection_core::signal";
    /// Observable source collections.
    pub const SOURCE: &str = "lattice_projection::source";
    /// Projected collection synchronization.
    pub const PROJECTED: &str = "lattice_projection::projected";
}
