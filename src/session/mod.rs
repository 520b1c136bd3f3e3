//! Connection session tracking

pub mod state;

pub use state::{ConnectionState, SessionState};
