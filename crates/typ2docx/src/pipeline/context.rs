use std::path::{Path, PathBuf};

use crate::config::EngineKind;

/// Everything one conversion needs to know, fixed at construction.
///
/// The pipeline only ever borrows a job; branches that need derived values
/// compute them locally.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    id: String,
    input: PathBuf,
    output: PathBuf,
    engine: EngineKind,
    typst_opts: Vec<String>,
    debug: bool,
    cwd: PathBuf,
}

impl ConversionJob {
    /// Creates a job for `input`, resolved against `cwd`. The output
    /// defaults to the input's file name with a `.docx` extension in `cwd`.
    pub fn new(input: impl AsRef<Path>, engine: EngineKind, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        let input = cwd.join(input.as_ref());
        let output = default_output(&input, &cwd);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input,
            output,
            engine,
            typst_opts: Vec::new(),
            debug: false,
            cwd,
        }
    }

    pub fn with_output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = self.cwd.join(output.as_ref());
        self
    }

    /// Options forwarded verbatim to `typst compile`.
    pub fn with_typst_opts(mut self, opts: Vec<String>) -> Self {
        self.typst_opts = opts;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn typst_opts(&self) -> &[String] {
        &self.typst_opts
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

/// `<cwd>/<input stem>.docx`
pub fn default_output(input: &Path, cwd: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| Path::new(n).with_extension("docx"))
        .unwrap_or_else(|| PathBuf::from("main.docx"));
    cwd.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_lands_in_cwd() {
        let job = ConversionJob::new("thesis/main.typ", EngineKind::Cloud, "/work");
        assert_eq!(job.input(), Path::new("/work/thesis/main.typ"));
        assert_eq!(job.output(), Path::new("/work/main.docx"));
    }

    #[test]
    fn test_absolute_input_kept() {
        let job = ConversionJob::new("/docs/paper.typ", EngineKind::Desktop, "/work");
        assert_eq!(job.input(), Path::new("/docs/paper.typ"));
        assert_eq!(job.output(), Path::new("/work/paper.docx"));
    }

    #[test]
    fn test_explicit_output_resolved_against_cwd() {
        let job = ConversionJob::new("main.typ", EngineKind::Cloud, "/work")
            .with_output("out/report.docx");
        assert_eq!(job.output(), Path::new("/work/out/report.docx"));

        let job = ConversionJob::new("main.typ", EngineKind::Cloud, "/work")
            .with_output("/elsewhere/x.docx");
        assert_eq!(job.output(), Path::new("/elsewhere/x.docx"));
    }

    #[test]
    fn test_jobs_get_distinct_ids() {
        let a = ConversionJob::new("main.typ", EngineKind::Cloud, "/work");
        let b = ConversionJob::new("main.typ", EngineKind::Cloud, "/work");
        assert_ne!(a.id(), b.id());
        assert!(!a.debug());
        assert!(a.typst_opts().is_empty());
    }
}
