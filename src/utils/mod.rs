//! Shared helpers.

pub mod index;
