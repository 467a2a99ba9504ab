#![allow(dead_code)]

pub mod engine;
pub mod registry;

pub use engine::*;
pub use registry::*;
