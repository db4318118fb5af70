//! Domain model module declarations.

pub mod hook;
pub mod session;
