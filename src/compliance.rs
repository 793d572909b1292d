//! Compliance engine split into the modular engine and concrete rule modules

pub mod engine;
pub mod modules;

pub use engine::*;
