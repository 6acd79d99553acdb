//! Wires sources through resolution and synthesis into an [`ArtifactSink`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, info_span};

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::{Error, Result};
use crate::frontend::{self, Candidate, SourceFile};
use crate::merge::merge_fragments;
use crate::resolver::resolve;
use crate::synth::{synthesize, Fragment};

/// Fully qualified path of the marker attribute.
pub const MARKER_PATH: &str = "auto_decorator::decorator";

/// Name of the artifact that brings the marker attribute into scope.
pub const BOOTSTRAP_NAME: &str = "decorator.g.rs";

/// Emitted once per run, before any generated fragment.
pub const BOOTSTRAP_SOURCE: &str = "// @generated by auto-decorator. Do not edit.
#[allow(unused_imports)]
pub use ::auto_decorator::decorator;
";

/// Receives generated artifacts.
pub trait ArtifactSink {
    fn add_artifact(&mut self, name: &str, content: &str) -> Result<()>;
}

/// Collects artifacts in memory, in the order they were produced.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|(artifact, _)| artifact == name)
            .map(|(_, content)| content.as_str())
    }
}

impl ArtifactSink for MemorySink {
    fn add_artifact(&mut self, name: &str, content: &str) -> Result<()> {
        self.artifacts.push((name.to_string(), content.to_string()));
        Ok(())
    }
}

/// Writes each artifact to a file in a directory, creating the directory
/// on first use.
#[derive(Debug)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactSink for DirSink {
    fn add_artifact(&mut self, name: &str, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.dir.join(name);
        std::fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), "wrote artifact");
        Ok(())
    }
}

/// Hands artifacts to a sink, refusing to emit a name twice.
struct Emitter<'a> {
    sink: &'a mut dyn ArtifactSink,
    names: HashSet<String>,
}

impl Emitter<'_> {
    fn emit(&mut self, name: &str, content: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::DuplicateArtifact {
                name: name.to_string(),
            });
        }
        self.sink.add_artifact(name, content)
    }
}

/// Summary of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub candidates: usize,
    /// Names of the fragment artifacts, in emission order. A type whose name
    /// is shared with another generated type gets its module in the name.
    pub generated: Vec<String>,
    /// Marked types that needed no generation.
    pub skipped: Vec<String>,
    /// Names of merged source artifacts. Sources with the same file stem are
    /// named after their module instead.
    pub merged: Vec<String>,
}

enum Input {
    File(PathBuf),
    Text { name: String, text: String },
}

/// Configures and runs a generation pass.
pub struct Generator {
    inputs: Vec<(Input, String)>,
    marker: String,
    parallel: bool,
    merge: bool,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            marker: MARKER_PATH.to_string(),
            parallel: false,
            merge: false,
        }
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file mounted at the crate root.
    pub fn file(self, path: impl AsRef<Path>) -> Self {
        self.file_in(path, "crate")
    }

    /// Adds a file mounted at `module`, e.g. `crate::logging`.
    pub fn file_in(mut self, path: impl AsRef<Path>, module: &str) -> Self {
        self.inputs
            .push((Input::File(path.as_ref().to_path_buf()), module.to_string()));
        self
    }

    /// Adds in-memory source text mounted at `module`.
    pub fn source(mut self, name: &str, module: &str, text: impl Into<String>) -> Self {
        self.inputs.push((
            Input::Text {
                name: name.to_string(),
                text: text.into(),
            },
            module.to_string(),
        ));
        self
    }

    /// Overrides the fully qualified path of the marker attribute.
    pub fn marker(mut self, path: &str) -> Self {
        self.marker = path.to_string();
        self
    }

    /// Resolves and synthesizes candidates on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Also emits each affected source with its fragments merged in.
    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn run(&self, sink: &mut dyn ArtifactSink, cancel: &CancellationToken) -> Result<Report> {
        let span = info_span!("generate", sources = self.inputs.len());
        let _enter = span.enter();

        let mut emitter = Emitter {
            sink,
            names: HashSet::new(),
        };
        emitter.emit(BOOTSTRAP_NAME, BOOTSTRAP_SOURCE)?;

        let sources = self
            .inputs
            .iter()
            .map(|(input, module)| match input {
                Input::File(path) => SourceFile::read(path, module),
                Input::Text { name, text } => SourceFile::parse(name, module, text.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        cancel.check()?;

        let compilation = frontend::build(&sources, &self.marker);
        let model = &compilation.model;

        let process = |candidate: Candidate| -> Result<Option<Fragment>, Cancelled> {
            Ok(resolve(model, candidate, cancel)?.map(|resolution| synthesize(model, &resolution)))
        };
        let results: Vec<_> = if self.parallel {
            compilation
                .candidates
                .par_iter()
                .map(|&candidate| process(candidate))
                .collect::<Result<_, Cancelled>>()?
        } else {
            compilation
                .candidates
                .iter()
                .map(|&candidate| process(candidate))
                .collect::<Result<_, Cancelled>>()?
        };

        let mut report = Report {
            candidates: compilation.candidates.len(),
            ..Report::default()
        };
        let mut fragments = Vec::new();
        for (candidate, result) in compilation.candidates.iter().zip(results) {
            match result {
                Some(fragment) => fragments.push(fragment),
                None => report.skipped.push(model.ty(candidate.ty).name.clone()),
            }
        }

        let names = distinct_names(
            fragments
                .iter()
                .map(|fragment| (fragment.artifact_name(), fragment.qualified_artifact_name()))
                .collect(),
        );
        for (fragment, name) in fragments.iter().zip(names) {
            emitter.emit(&name, &fragment.render())?;
            report.generated.push(name);
        }

        if self.merge && !fragments.is_empty() {
            cancel.check()?;
            let merged = merge_fragments(model, &sources, &fragments);
            let names = distinct_names(
                merged
                    .iter()
                    .map(|&(index, _)| {
                        let source = &sources[index];
                        (merged_name(&source.path), qualified_merged_name(&source.module))
                    })
                    .collect(),
            );
            for ((_, text), name) in merged.iter().zip(names) {
                emitter.emit(&name, text)?;
                report.merged.push(name);
            }
        }

        info!(
            candidates = report.candidates,
            generated = report.generated.len(),
            skipped = report.skipped.len(),
            "generation finished"
        );
        Ok(report)
    }
}

/// Takes the plain name of each `(plain, qualified)` pair unless another
/// pair shares it.
fn distinct_names(names: Vec<(String, String)>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (plain, _) in &names {
        *counts.entry(plain.as_str()).or_default() += 1;
    }
    names
        .iter()
        .map(|(plain, qualified)| {
            if counts.get(plain.as_str()).copied().unwrap_or(0) > 1 {
                qualified.clone()
            } else {
                plain.clone()
            }
        })
        .collect()
}

fn qualified_merged_name(module: &str) -> String {
    format!("{}.merged.rs", module.replace("::", "."))
}

fn merged_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map_or_else(|| "source".into(), |stem| stem.to_string_lossy());
    format!("{stem}.merged.rs")
}
