//! Isolated project directory with scriptable external tools.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lopdf::{dictionary, Document, Object};
use tempfile::TempDir;

use typ2docx::{ConversionJob, EngineKind, RetryPolicy, Settings};

/// Fake compiler: writes a placeholder PDF to its last argument.
pub const TYPST_OK: &str = "for last; do :; done\necho PDF > \"$last\"\n";

/// Fake converter: `pandoc b.typ -o b.docx` becomes a copy.
pub const PANDOC_OK: &str = "cp \"$1\" \"$3\"\n";

/// Fake merge: concatenates both branch outputs.
pub const MERGE_OK: &str = "cat a.docx b.docx > c.docx\n";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Holds the Typst sources; also the job's working directory.
    pub project_dir: PathBuf,
    /// Holds the fake tools and the files they leave behind.
    pub tools_dir: PathBuf,
}

impl TestHarness {
    /// Creates a harness whose tools all succeed.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let project_dir = temp_dir.path().join("project");
        let tools_dir = temp_dir.path().join("tools");
        std::fs::create_dir_all(&project_dir).expect("Failed to create project dir");
        std::fs::create_dir_all(&tools_dir).expect("Failed to create tools dir");

        let harness = Self {
            temp_dir,
            project_dir,
            tools_dir,
        };
        harness.install_tool("typst", TYPST_OK);
        harness.install_tool("pandoc", PANDOC_OK);
        harness.install_tool("merge.sh", MERGE_OK);
        harness
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes an executable shell script into the tools directory,
    /// replacing any previous one of the same name.
    pub fn install_tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tools_dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("Failed to write tool");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make tool executable");
        path
    }

    /// A file the fake tools can touch to prove they ran.
    pub fn marker(&self, name: &str) -> PathBuf {
        self.tools_dir.join(format!("{}.ran", name))
    }

    pub fn write_source(&self, name: &str, content: &str) -> PathBuf {
        let path = self.project_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create source dir");
        }
        std::fs::write(&path, content).expect("Failed to write source");
        path
    }

    /// Writes a one-page PDF that the fake compiler can hand out.
    pub fn write_pdf_fixture(&self) -> PathBuf {
        let path = self.tools_dir.join("fixture.pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&path).expect("Failed to write PDF fixture");
        path
    }

    /// Settings pointing at the fake tools, with short waits.
    pub fn settings(&self) -> Settings {
        Settings {
            typst: self.tools_dir.join("typst"),
            pandoc: self.tools_dir.join("pandoc"),
            merge_script: Some(self.tools_dir.join("merge.sh")),
            callback_timeout: Duration::from_secs(10),
            export_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            warmup_delay: Duration::from_millis(10),
            result_retry: RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(20),
            },
            ..Default::default()
        }
    }

    pub fn job(&self, input: &str) -> ConversionJob {
        ConversionJob::new(input, EngineKind::Cloud, &self.project_dir)
    }

    /// Directories left behind by ephemeral workspaces under `dir`.
    pub fn leftover_workspaces(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .map(|n| n.to_string_lossy().starts_with("typ2docx_"))
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sets an environment variable for the lifetime of the guard.
pub struct EnvGuard {
    name: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    pub fn set(name: &'static str, value: &Path) -> Self {
        let previous = std::env::var(name).ok();
        std::env::set_var(name, value);
        Self { name, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => std::env::set_var(self.name, value),
            None => std::env::remove_var(self.name),
        }
    }
}
