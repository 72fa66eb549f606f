//! Request handlers.

pub mod batch;
