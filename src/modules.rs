//! # Module loader
//!
//! Resolves `use "path"` statements to files on disk and executes them in
//! the importing frame: no namespace isolation, a module loaded once
//! never re-executes, and a cycle reports a diagnostic instead of
//! recursing forever.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::context::FrameHandle;
use crate::diagnostics::{DiagnosticKind, Diagnostics, SourceLocation};
use crate::interpreter::{self, EvalContext, ModuleLoader};
use crate::lexer;
use crate::parser;
use rand::RngCore;

/// Resolves and executes Flow source files pulled in by `use`.
///
/// Tracks canonical paths in two sets: `loaded` (fully executed, never
/// re-run) and `loading` (currently on the import stack, for cycle
/// detection). Both persist across the whole engine run, not per call.
pub struct FileModuleLoader {
    stdlib_dir: PathBuf,
    loaded: HashSet<PathBuf>,
    loading: Vec<PathBuf>,
}

impl FileModuleLoader {
    pub fn new(stdlib_dir: PathBuf) -> Self {
        Self { stdlib_dir, loaded: HashSet::new(), loading: Vec::new() }
    }

    fn resolve_path(&self, raw_path: &str, importing_file: Option<&Path>) -> PathBuf {
        if let Some(name) = raw_path.strip_prefix('@') {
            return self.stdlib_dir.join(format!("{name}.flow"));
        }
        let candidate = Path::new(raw_path);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        match importing_file.and_then(Path::parent) {
            Some(dir) => dir.join(candidate),
            None => candidate.to_path_buf(),
        }
    }

    fn canonical(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    /// Registers `path` as already loaded without executing it. The entry
    /// file passed to [`crate::engine::Engine::run_file`] is interpreted
    /// directly by the engine, not through [`FileModuleLoader::resolve_and_load`],
    /// so without this a `use` cycle back to the entry file itself would
    /// re-execute it once before `loaded` caught the repeat.
    pub fn mark_loaded(&mut self, path: &Path) {
        self.loaded.insert(Self::canonical(path));
    }
}

impl ModuleLoader for FileModuleLoader {
    fn resolve_and_load(
        &mut self,
        raw_path: &str,
        importing_file: Option<&Path>,
        frame: &FrameHandle,
        diags: &mut Diagnostics,
        location: SourceLocation,
    ) {
        let resolved = self.resolve_path(raw_path, importing_file);
        let canonical = Self::canonical(&resolved);

        if self.loaded.contains(&canonical) {
            return;
        }
        if self.loading.contains(&canonical) {
            diags.push(DiagnosticKind::ModuleCycle(raw_path.to_string()), location);
            return;
        }

        let source = match std::fs::read_to_string(&resolved) {
            Ok(s) => s,
            Err(_) => {
                diags.push(DiagnosticKind::ModuleNotFound(raw_path.to_string()), location);
                return;
            }
        };

        self.loading.push(canonical.clone());

        let before = diags.len();
        let tokens = lexer::tokenize(&source, diags);
        let program = parser::parse(tokens, diags);

        // A `use` inside this module resolves against its own file and
        // shares this loader's loaded/loading sets, so reborrow `self`
        // rather than spin up an isolated loader.
        let mut rng = NullRng;
        let mut child_ctx = EvalContext {
            diags,
            loader: &mut *self,
            rng: &mut rng,
            current_file: Some(resolved.clone()),
        };
        interpreter::execute(frame, &program, &mut child_ctx);

        // A cycle or a missing file already names itself precisely; only
        // wrap genuine lex/parse/runtime failures inside the module's own
        // source, so this doesn't double-report a cycle as both a
        // ModuleCycle and a nested failure.
        let new_diagnostics_include_non_module_failures = diags
            .iter()
            .skip(before)
            .any(|d| !matches!(d.kind, DiagnosticKind::ModuleNotFound(_) | DiagnosticKind::ModuleCycle(_) | DiagnosticKind::ModuleNestedFailure { .. }));
        if new_diagnostics_include_non_module_failures {
            diags.push(
                DiagnosticKind::ModuleNestedFailure {
                    path: raw_path.to_string(),
                    message: format!("{} diagnostic(s) while loading", diags.len() - before),
                },
                location,
            );
        }

        self.loading.pop();
        self.loaded.insert(canonical);
    }
}

struct NullRng;

impl RngCore for NullRng {
    fn next_u32(&mut self) -> u32 {
        0
    }
    fn next_u64(&mut self) -> u64 {
        0
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        dest.fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Frame;
    use std::io::Write;

    #[test]
    fn loading_the_same_module_twice_only_executes_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = dir.path().join("counter.flow");
        std::fs::File::create(&module_path).unwrap().write_all(b"Int n = 1;").unwrap();

        let mut loader = FileModuleLoader::new(dir.path().to_path_buf());
        let mut diags = Diagnostics::new();
        let frame = Frame::new_root();

        loader.resolve_and_load(
            module_path.to_str().unwrap(),
            None,
            &frame,
            &mut diags,
            SourceLocation::new(1, 1),
        );
        assert!(crate::context::lookup_var(&frame, "n").is_some());

        // Second load is a no-op; redeclaring `n` would otherwise collide.
        loader.resolve_and_load(
            module_path.to_str().unwrap(),
            None,
            &frame,
            &mut diags,
            SourceLocation::new(1, 1),
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn missing_module_reports_not_found() {
        let mut loader = FileModuleLoader::new(PathBuf::from("/nonexistent/stdlib"));
        let mut diags = Diagnostics::new();
        let frame = Frame::new_root();
        loader.resolve_and_load("/nonexistent/path.flow", None, &frame, &mut diags, SourceLocation::new(1, 1));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn a_runtime_error_inside_a_module_is_wrapped_as_a_nested_failure() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = dir.path().join("broken.flow");
        std::fs::File::create(&module_path).unwrap().write_all(b"Int n = 1 / 0;").unwrap();

        let mut loader = FileModuleLoader::new(dir.path().to_path_buf());
        let mut diags = Diagnostics::new();
        let frame = Frame::new_root();

        loader.resolve_and_load(
            module_path.to_str().unwrap(),
            None,
            &frame,
            &mut diags,
            SourceLocation::new(1, 1),
        );

        assert_eq!(diags.len(), 2);
        assert!(diags.iter().any(|d| matches!(d.kind, DiagnosticKind::ModuleNestedFailure { .. })));
    }
}
