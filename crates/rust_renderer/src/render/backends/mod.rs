//! Backend implementations

pub mod headless;

pub use headless::{HeadlessBackend, HeadlessProbe};
