//! Command-line entry point: run a file, evaluate a one-liner, watch a
//! file for changes, or drop into a REPL when given nothing to run.
//! Reads a source file, reports errors, and exits non-zero on failure,
//! built on `clap` rather than hand-rolled `env::args()` scanning, since
//! a REPL/watch/eval binary has more than one positional shape to
//! support.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use flow_lang::engine::Engine;

/// Run Flow programs: compile and interpret algorithmic music compositions.
#[derive(Parser, Debug)]
#[command(name = "flow", version, about)]
struct Cli {
    /// Source file to run. Omit to start a REPL.
    file: Option<PathBuf>,

    /// Evaluate a single expression or statement and exit.
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Re-run FILE every time it changes on disk, until interrupted.
    #[arg(long)]
    watch: bool,

    /// Directory searched for `use "@name"` stdlib modules.
    #[arg(long, default_value = ".")]
    stdlib_dir: PathBuf,

    /// Seed the PRNG for reproducible `??` choices.
    #[arg(long)]
    seed: Option<u64>,
}

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(300);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `anyhow` only shows up at this boundary — everything below a program's
/// own diagnostics stay in `Diagnostics`; this is for failures the
/// language itself never gets a chance to report, like an unreadable file.
fn try_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut engine = match cli.seed {
        Some(seed) => Engine::with_seed(cli.stdlib_dir.clone(), seed),
        None => Engine::new(cli.stdlib_dir.clone()),
    };

    if let Some(source) = &cli.eval {
        return Ok(run_once(&mut engine, source, None));
    }

    if cli.watch {
        let Some(path) = &cli.file else {
            eprintln!("--watch requires a file to watch");
            return Ok(ExitCode::FAILURE);
        };
        return Ok(watch_loop(&mut engine, path));
    }

    match &cli.file {
        Some(path) => run_file(&mut engine, path),
        None => Ok(repl(&mut engine)),
    }
}

fn run_file(engine: &mut Engine, path: &PathBuf) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(run_once(engine, &source, Some(path.clone())))
}

fn run_once(engine: &mut Engine, source: &str, file: Option<PathBuf>) -> ExitCode {
    engine.run(source, file);
    report(engine)
}

fn report(engine: &Engine) -> ExitCode {
    let diags = engine.diagnostics();
    if diags.is_empty() {
        ExitCode::SUCCESS
    } else {
        eprint!("{diags}");
        ExitCode::FAILURE
    }
}

fn watch_loop(engine: &mut Engine, path: &PathBuf) -> ExitCode {
    let mut last_modified = None;
    let mut last_status = ExitCode::SUCCESS;
    loop {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if modified != last_modified {
            last_modified = modified;
            println!("--- running {} ---", path.display());
            last_status = match run_file(engine, path) {
                Ok(code) => code,
                Err(err) => {
                    eprintln!("error: {err:#}");
                    ExitCode::FAILURE
                }
            };
        }
        std::thread::sleep(WATCH_POLL_INTERVAL);
        if std::env::var_os("FLOW_WATCH_ONCE").is_some() {
            return last_status;
        }
    }
}

fn repl(engine: &mut Engine) -> ExitCode {
    println!("flow repl — enter statements, Ctrl-D to exit");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {
                let values = engine.run(&line, None);
                let diags = engine.diagnostics();
                if diags.is_empty() {
                    for value in &values {
                        println!("{value:?}");
                    }
                } else {
                    eprint!("{diags}");
                }
            }
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}
