//! Periodic background tasks.

pub mod session_expiry;

pub use session_expiry::start_session_expiry_sweep;
