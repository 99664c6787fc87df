use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};
use typst_syntax::ast::{AstNode, Expr, ModuleImport, ModuleInclude};
use typst_syntax::{SyntaxKind, SyntaxNode};

use crate::config::{Settings, WorkerFlavor};
use crate::error::{ConfigError, ConvertError, Result};
use crate::runner::{self, InProcess, JsonProgram, Program};

const ROOT_OPTION: &str = "--root";

/// Collects the source text of every equation reachable from `entry`, in
/// document order.
///
/// String-path `#include` and `#import` targets are followed once each.
/// Paths starting with `/` resolve against `root` (the entry's directory
/// when `None`); package imports (`@preview/...`) are skipped.
pub fn extract_equations(entry: &Path, root: Option<&Path>) -> Result<Vec<String>> {
    let entry = canonical(entry)?;
    let root = match root {
        Some(root) => canonical(root)?,
        None => entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let mut walker = Walker {
        root,
        visited: HashSet::new(),
        equations: Vec::new(),
    };
    walker.visit_file(&entry)?;

    debug!(
        "Extracted {} equations from {} files",
        walker.equations.len(),
        walker.visited.len()
    );
    Ok(walker.equations)
}

struct Walker {
    root: PathBuf,
    visited: HashSet<PathBuf>,
    equations: Vec<String>,
}

impl Walker {
    fn visit_file(&mut self, file: &Path) -> Result<()> {
        if !self.visited.insert(file.to_path_buf()) {
            return Ok(());
        }
        let source = std::fs::read_to_string(file).map_err(|e| {
            ConvertError::Extraction(format!("Failed to read '{}': {}", file.display(), e))
        })?;
        let tree = typst_syntax::parse(&source);
        self.visit_node(&tree, file)
    }

    fn visit_node(&mut self, node: &SyntaxNode, file: &Path) -> Result<()> {
        if node.kind() == SyntaxKind::Equation {
            self.equations.push(node.clone().into_text().to_string());
        }

        let target = if let Some(import) = ModuleImport::from_untyped(node) {
            string_path(import.source())
        } else if let Some(include) = ModuleInclude::from_untyped(node) {
            string_path(include.source())
        } else {
            None
        };
        if let Some(target) = target {
            let resolved = self.resolve(&target, file)?;
            self.visit_file(&resolved)?;
        }

        for child in node.children() {
            self.visit_node(child, file)?;
        }
        Ok(())
    }

    fn resolve(&self, target: &str, from: &Path) -> Result<PathBuf> {
        let path = match target.strip_prefix('/') {
            Some(rooted) => self.root.join(rooted),
            None => from
                .parent()
                .map(|dir| dir.join(target))
                .ok_or_else(|| {
                    ConvertError::Extraction(format!(
                        "Cannot resolve '{}' from '{}'",
                        target,
                        from.display()
                    ))
                })?,
        };
        let path = if path.extension().is_none() {
            path.with_extension("typ")
        } else {
            path
        };
        canonical(&path)
    }
}

fn string_path(expr: Expr<'_>) -> Option<String> {
    match expr {
        Expr::Str(s) if !s.get().starts_with('@') => Some(s.get().to_string()),
        _ => None,
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|_| ConvertError::Extraction(format!("File not found: {}", path.display())))
}

/// Reads the project root override out of pass-through compiler options.
///
/// Accepts both `--root <dir>` and `--root=<dir>`; the last occurrence wins.
pub fn parse_root_option(opts: &[String]) -> std::result::Result<Option<PathBuf>, ConfigError> {
    let mut root = None;
    let mut iter = opts.iter();
    while let Some(opt) = iter.next() {
        if opt == ROOT_OPTION {
            match iter.next() {
                Some(value) if !value.is_empty() => root = Some(PathBuf::from(value)),
                _ => {
                    return Err(ConfigError::MissingOptionValue {
                        option: ROOT_OPTION.to_string(),
                    })
                }
            }
        } else if let Some(value) = opt.strip_prefix("--root=") {
            if value.is_empty() {
                return Err(ConfigError::MissingOptionValue {
                    option: ROOT_OPTION.to_string(),
                });
            }
            root = Some(PathBuf::from(value));
        }
    }
    Ok(root)
}

/// An equation is empty when nothing but whitespace sits between its
/// delimiters.
pub fn is_empty_equation(equation: &str) -> bool {
    let mut chars = equation.chars();
    chars.next();
    chars.next_back();
    chars.as_str().trim().is_empty()
}

/// Builds the equation-only source: non-empty equations in order, separated
/// by a blank line.
pub fn math_document(equations: &[String]) -> String {
    equations
        .iter()
        .filter(|eq| !is_empty_equation(eq))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Runs the extractor on the configured worker flavor.
pub async fn extract(
    settings: &Settings,
    entry: &Path,
    root: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let span = tracing::info_span!("processor.extract", worker = ?settings.extract_worker);
    dispatch(settings, entry, root, cancel).instrument(span).await
}

async fn dispatch(
    settings: &Settings,
    entry: &Path,
    root: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    match settings.extract_worker {
        WorkerFlavor::Thread => {
            let entry = entry.to_path_buf();
            let root = root.map(Path::to_path_buf);
            let task = InProcess::new("extract", move || {
                extract_equations(&entry, root.as_deref())
            });
            runner::run(task, cancel).await
        }
        WorkerFlavor::Process => {
            let exe = match &settings.self_exe {
                Some(exe) => exe.clone(),
                None => std::env::current_exe().map_err(|e| ConvertError::io("<self>", e))?,
            };
            let mut program = Program::new(exe).arg("extract").arg(entry);
            if let Some(root) = root {
                program = program.arg(ROOT_OPTION).arg(root);
            }
            runner::run(JsonProgram::<Vec<String>>::new(program), cancel).await
        }
    }
}
