//! Shared value types

pub mod decision;
