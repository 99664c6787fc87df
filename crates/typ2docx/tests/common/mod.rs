//! Shared test utilities for typ2docx integration tests.
//!
//! - `TestHarness`: a project directory plus fake `typst`, `pandoc` and
//!   merge scripts in a temp dir
//! - Doubles for the export backends and the desktop application

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
