use std::fmt;

use thiserror::Error;

use crate::error::{one_line, ConvertError};

/// The two concurrent sub-pipelines of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Document to PDF to Word.
    FullFidelity,
    /// Equations to Typst to Word.
    MathOnly,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::FullFidelity => write!(f, "document branch"),
            Branch::MathOnly => write!(f, "equation branch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Workspace,
    Compile,
    Export,
    Extract,
    Convert,
    Merge,
    Finalize,
}

impl Stage {
    pub fn branch(self) -> Option<Branch> {
        match self {
            Stage::Compile | Stage::Export => Some(Branch::FullFidelity),
            Stage::Extract | Stage::Convert => Some(Branch::MathOnly),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "pre-flight check",
            Stage::Workspace => "workspace setup",
            Stage::Compile => "Typst compile",
            Stage::Export => "Word export",
            Stage::Extract => "equation extraction",
            Stage::Convert => "Pandoc conversion",
            Stage::Merge => "merge",
            Stage::Finalize => "finalize",
        };
        match self.branch() {
            Some(branch) => write!(f, "{} ({})", name, branch),
            None => f.write_str(name),
        }
    }
}

/// Outcome of a failed job: the first failure in completion order, plus
/// any later ones.
#[derive(Error, Debug)]
#[error("{stage} failed: {}{}", one_line(&.source.to_string()), suppressed_suffix(.suppressed))]
pub struct PipelineError {
    pub stage: Stage,
    pub source: ConvertError,
    pub suppressed: Vec<PipelineError>,
}

impl PipelineError {
    pub fn new(stage: Stage, source: ConvertError) -> Self {
        Self {
            stage,
            source,
            suppressed: Vec::new(),
        }
    }

    pub fn branch(&self) -> Option<Branch> {
        self.stage.branch()
    }

    /// Attaches a later failure. A later cancellation was caused by the
    /// first failure (or the same external cancel) and is dropped.
    pub fn suppress(mut self, later: PipelineError) -> Self {
        if later.source.is_cancelled() {
            tracing::debug!("{} stopped after sibling failure", later.stage);
        } else {
            tracing::debug!("Suppressed secondary failure: {}", later);
            self.suppressed.push(later);
        }
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

fn suppressed_suffix(suppressed: &[PipelineError]) -> String {
    match suppressed.len() {
        0 => String::new(),
        1 => " (1 further failure)".to_string(),
        n => format!(" ({} further failures)", n),
    }
}
