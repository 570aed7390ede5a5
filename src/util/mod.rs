//! Utility functions.

pub mod hash;
