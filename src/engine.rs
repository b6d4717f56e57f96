//! # Engine
//!
//! The top-level owner of everything a Flow program needs to run: the
//! root frame (carrying the stdlib registry installed once at
//! construction), the seeded PRNG, the module loader's loaded/loading
//! state, and the per-run diagnostics accumulator. The PRNG and the
//! stdlib registry are the only state meant to survive across runs —
//! everything else is scoped to one call to [`Engine::run`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::builtins;
use crate::context::{Frame, FrameHandle};
use crate::diagnostics::Diagnostics;
use crate::interpreter::{self, EvalContext};
use crate::lexer;
use crate::modules::FileModuleLoader;
use crate::parser;
use crate::synth::{self, Synth};
use crate::value::Value;

pub struct Engine {
    frame: FrameHandle,
    loader: FileModuleLoader,
    rng: Rc<RefCell<StdRng>>,
    seed: u64,
    diagnostics: Diagnostics,
}

impl Engine {
    /// A fresh, randomly-seeded engine. `stdlib_dir` backs `use "@name"`
    /// resolution.
    pub fn new(stdlib_dir: PathBuf) -> Self {
        Self::with_seed(stdlib_dir, rand::random())
    }

    pub fn with_seed(stdlib_dir: PathBuf, seed: u64) -> Self {
        let frame = Frame::new_root();
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
        builtins::register_all(&frame, build_synth_registry(), Rc::clone(&rng));
        Self {
            frame,
            loader: FileModuleLoader::new(stdlib_dir),
            rng,
            seed,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Reseeds the PRNG going forward; does not touch frame state. Shared
    /// with any `Host` builtin (e.g. Song `render`) that holds its own
    /// clone of the same `Rc<RefCell<_>>`, so a reseed here governs its
    /// draws too.
    pub fn seed_rng(&mut self, seed: u64) {
        self.seed = seed;
        *self.rng.borrow_mut() = StdRng::seed_from_u64(seed);
    }

    /// Restarts the PRNG from whichever seed it was last given, so `??`
    /// note-stream choices replay identically.
    pub fn reset_rng(&mut self) {
        *self.rng.borrow_mut() = StdRng::seed_from_u64(self.seed);
    }

    pub fn frame(&self) -> &FrameHandle {
        &self.frame
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs one unit of source in the engine's persistent frame —
    /// declarations and mutations from earlier calls stay visible, but
    /// diagnostics are cleared first: each call is its own "run" for
    /// success-or-failure purposes, even across a REPL's many lines.
    /// Returns the accumulated implicit-return values produced by this
    /// call's top-level expression statements.
    pub fn run(&mut self, source: &str, current_file: Option<PathBuf>) -> Vec<Value> {
        self.diagnostics.clear();
        let tokens = lexer::tokenize(source, &mut self.diagnostics);
        let program = parser::parse(tokens, &mut self.diagnostics);
        let mut rng = self.rng.borrow_mut();
        let mut ctx = EvalContext {
            diags: &mut self.diagnostics,
            loader: &mut self.loader,
            rng: &mut *rng,
            current_file,
        };
        interpreter::execute(&self.frame, &program, &mut ctx);
        let values = self.frame.borrow().implicit_values.clone();
        self.frame.borrow_mut().implicit_values.clear();
        values
    }

    pub fn run_file(&mut self, path: &Path) -> std::io::Result<Vec<Value>> {
        let source = std::fs::read_to_string(path)?;
        self.loader.mark_loaded(path);
        Ok(self.run(&source, Some(path.to_path_buf())))
    }
}

fn build_synth_registry() -> Rc<HashMap<&'static str, Rc<dyn Synth>>> {
    let mut map: HashMap<&'static str, Rc<dyn Synth>> = HashMap::new();
    for (name, boxed) in synth::default_registry() {
        map.insert(name, Rc::from(boxed));
    }
    Rc::new(map)
}
