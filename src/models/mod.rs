//! Domain model module declarations.

pub mod artifact;
pub mod command;
pub mod host;
pub mod remote;
pub mod worker;
