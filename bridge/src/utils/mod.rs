//! Utility modules for dida-bridge.
//!
//! # Modules
//!
//! - [`debounce`]: Trailing-edge debouncing of note edit signals

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError};
