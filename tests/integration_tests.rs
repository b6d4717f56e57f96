//! End-to-end tests driving full programs through `Engine::run`, covering
//! the diagnostics-accumulate-don't-abort model, overload scoring,
//! closures, module cycles, and song rendering together rather than one
//! pipeline stage at a time.

use std::io::Write;
use std::path::PathBuf;

use pretty_assertions::assert_eq;

use flow_lang::engine::Engine;
use flow_lang::value::Value;

fn stdlib_dir() -> PathBuf {
    let dir = tempfile::tempdir().unwrap().into_path();
    std::fs::write(dir.join("std.flow"), "").unwrap();
    dir
}

fn engine() -> Engine {
    Engine::with_seed(stdlib_dir(), 1)
}

#[test]
fn arithmetic_and_printing_emits_one_line() {
    let mut eng = engine();
    eng.run(r#"use "@std"; Int x = 3 + 4 * 2; (print (str x))"#, None);
    assert!(eng.diagnostics().is_empty());
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "x"), Some(Value::Int(11))));
}

#[test]
fn closure_snapshot_survives_a_later_mutation() {
    let mut eng = engine();
    eng.run(
        r#"use "@std"; Int x = 10; Function f = fn Int n => (add n x); x = 999; Int result = (f 5);"#,
        None,
    );
    assert!(eng.diagnostics().is_empty());
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "result"), Some(Value::Int(15))));
}

#[test]
fn sequence_compiles_with_auto_fit_in_default_four_four() {
    let mut eng = engine();
    eng.run(r#"Sequence s = | C4 D4 E4 F4 |;"#, None);
    assert!(eng.diagnostics().is_empty());
    match flow_lang::context::lookup_var(eng.frame(), "s") {
        Some(Value::Sequence(bars)) => {
            assert_eq!(bars.len(), 1);
            let bar = &bars[0];
            assert_eq!(bar.notes.len(), 4);
            for (note, letter) in bar.notes.iter().zip(['C', 'D', 'E', 'F']) {
                assert_eq!(note.duration, flow_lang::ast::DurationClass::Quarter);
                assert!(!note.dotted);
                assert!(!note.tied);
                let pitch = note.pitch.as_ref().expect("pitched note");
                assert_eq!(pitch.letter, letter);
                assert_eq!(pitch.octave, Some(4));
            }
        }
        other => panic!("expected a sequence, got {:?}", other),
    }
}

#[test]
fn overload_resolution_picks_the_exact_numeric_type_and_string_is_identity() {
    let mut eng = engine();
    eng.run(
        r#"use "@std";
String a = (str 3);
String b = (str 3.0);
String c = (str "already a string");"#,
        None,
    );
    assert!(eng.diagnostics().is_empty());
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "a"), Some(Value::Str(s)) if s == "3"));
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "b"), Some(Value::Str(s)) if s == "3"));
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "c"), Some(Value::Str(s)) if s == "already a string"));
}

#[test]
fn a_module_cycle_reports_exactly_one_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::File::create(dir.path().join("a.flow")).unwrap().write_all(b"use \"b.flow\";").unwrap();
    std::fs::File::create(dir.path().join("b.flow")).unwrap().write_all(b"use \"a.flow\";").unwrap();

    let mut eng = Engine::with_seed(dir.path().to_path_buf(), 1);
    let result = eng.run_file(&dir.path().join("a.flow")).unwrap();
    assert!(result.is_empty());
    assert_eq!(eng.diagnostics().len(), 1);
}

#[test]
fn rendering_one_bar_at_default_tempo_produces_the_expected_frame_count() {
    let mut eng = engine();
    eng.run(
        r#"Sequence s = | C4 |;
Buffer mix = (render s "sine" 44100 120.0);"#,
        None,
    );
    assert!(eng.diagnostics().is_empty());
    match flow_lang::context::lookup_var(eng.frame(), "mix") {
        Some(Value::Buffer(buf)) => {
            let buf = buf.borrow();
            // 60 / 120 bpm * 4 beats * 44_100 Hz = 88_200 frames, mono.
            assert_eq!(buf.samples.len(), 88_200);
            assert!(buf.samples.iter().take(100).any(|s| s.abs() > 0.0));
        }
        other => panic!("expected a buffer, got {:?}", other),
    }
}

#[test]
fn errors_accumulate_instead_of_aborting_the_run() {
    let mut eng = engine();
    eng.run("Int a = 1 / 0; Int b = unknown_name; Int c = 3;", None);
    assert_eq!(eng.diagnostics().len(), 2);
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "c"), Some(Value::Int(3))));
}

#[test]
fn redeclaring_an_overload_with_the_same_signature_replaces_it() {
    let mut eng = engine();
    eng.run(
        r#"internal proc double(Int n)
  return n + n
end
internal proc double(Int n)
  return n * 3
end
Int result = (double 4);"#,
        None,
    );
    assert!(eng.diagnostics().is_empty());
    assert!(matches!(flow_lang::context::lookup_var(eng.frame(), "result"), Some(Value::Int(12))));
}
