//! Utility types: signal handling for graceful shutdown.

pub mod sig_down;

pub use sig_down::SigDown;
