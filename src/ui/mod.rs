//! User interfaces

pub mod stdio;
