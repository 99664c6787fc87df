//! Pipeline stages backed by external tools or local parsing.
//!
//! - [`typst`]: compiles the document (with preamble) to PDF
//! - [`equations`]: extracts equations and builds the math-only source
//! - [`pandoc`]: converts the math-only source to a Word fragment
//! - [`merge`]: combines both Word documents with the merge script

pub mod equations;
pub mod merge;
pub mod pandoc;
pub mod typst;

pub use equations::{extract, extract_equations, math_document, parse_root_option};
