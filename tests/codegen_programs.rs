mod common;

use common::{run_compiler, run_compiler_stdin};

const SCENARIOS: [(&str, &str); 6] = [
    ("return_literal.tc", "int main() { return 42; }"),
    ("precedence.tc", "int main() { return 1+2*3-4/2; }"),
    (
        "if_else.tc",
        "int main() { int x=3; if (x<5) return 10; else return 20; }",
    ),
    (
        "loop_break_continue.tc",
        "int main(){ int s=0; int i=0; while(i<10){ i=i+1; if(i==5) continue; if(i==8) break; s=s+i; } return s; }",
    ),
    (
        "call.tc",
        "int add(int a,int b){ return a+b; } int main(){ return add(7,35); }",
    ),
    (
        "short_circuit.tc",
        "int side(int x){ return x; } int main(){ int a=0; if (a!=0 && side(1/a)) return 1; return 0; }",
    ),
];

#[test]
fn the_end_to_end_scenarios_compile() {
    for (file, src) in SCENARIOS {
        for flags in [&[][..], &["-opt"][..]] {
            let result = run_compiler("codegen", src, file, flags);
            assert!(
                result.ok(),
                "{} with {:?} failed:\n{}",
                file,
                flags,
                result.stderr
            );
            assert!(result.stdout.contains(".text"), "{}", result.stdout);
            assert!(result.stdout.contains(".global main"), "{}", result.stdout);
            assert!(result.stdout.contains("main:"), "{}", result.stdout);
            assert!(
                result.stdout.contains("main_epilogue:"),
                "{}",
                result.stdout
            );
            assert!(result.stdout.contains("ret"), "{}", result.stdout);
        }
    }
}

#[test]
fn compilation_is_deterministic() {
    for (file, src) in SCENARIOS {
        for flags in [&[][..], &["-opt"][..], &["-opt", "-inline"][..]] {
            let a = run_compiler("codegen", src, file, flags);
            let b = run_compiler("codegen", src, file, flags);
            assert!(a.ok() && b.ok());
            assert_eq!(
                a.stdout, b.stdout,
                "{} with {:?} must be byte-identical",
                file, flags
            );
        }
    }
}

#[test]
fn a_literal_return_loads_the_value_into_a0() {
    let result = run_compiler("codegen", "int main() { return 42; }", "lit.tc", &[]);
    assert!(result.ok());
    assert!(
        result.stdout.contains("li a0, 42"),
        "42 must travel through a0:\n{}",
        result.stdout
    );
    assert!(result.stdout.contains("j main_epilogue"), "{}", result.stdout);
}

#[test]
fn calls_use_the_argument_registers() {
    let (file, src) = SCENARIOS[4];
    let result = run_compiler("codegen", src, file, &[]);
    assert!(result.ok());
    assert!(result.stdout.contains(".global add"), "{}", result.stdout);
    assert!(result.stdout.contains("call add"), "{}", result.stdout);
    assert!(result.stdout.contains("li a0, 7"), "{}", result.stdout);
    assert!(result.stdout.contains("li a1, 35"), "{}", result.stdout);
}

#[test]
fn short_circuit_programs_keep_the_guarded_division() {
    let (file, src) = SCENARIOS[5];
    // Unoptimized, the guarded call and its division are still in the
    // text; the guard just never lets them run.
    let plain = run_compiler("codegen", src, file, &[]);
    assert!(plain.ok(), "{}", plain.stderr);
    assert!(
        plain.stdout.contains("call side"),
        "the call stays behind its guard:\n{}",
        plain.stdout
    );
    assert!(plain.stdout.contains("div"), "{}", plain.stdout);

    // With -opt the guard is provably false and the whole arm folds
    // away; main still compiles and answers 0.
    let opt = run_compiler("codegen", src, file, &["-opt"]);
    assert!(opt.ok(), "{}", opt.stderr);
    assert!(opt.stdout.contains("li a0, 0"), "{}", opt.stdout);
}

#[test]
fn every_register_strategy_produces_a_program() {
    let (file, src) = SCENARIOS[3];
    for strategy in ["naive", "linear", "color"] {
        let result = run_compiler("codegen", src, file, &["-regalloc", strategy]);
        assert!(
            result.ok(),
            "-regalloc {} failed:\n{}",
            strategy,
            result.stderr
        );
        assert!(result.stdout.contains("main:"));
        let again = run_compiler("codegen", src, file, &["-regalloc", strategy]);
        assert_eq!(result.stdout, again.stdout, "-regalloc {}", strategy);
    }
    // Allocating strategies keep their promise to save what they use.
    let colored = run_compiler("codegen", src, file, &["-regalloc", "color"]);
    if colored.stdout.contains("mv s1,") || colored.stdout.contains("mv s1 ") {
        assert!(
            colored.stdout.contains("sw s1,"),
            "an assigned callee-saved register must be saved:\n{}",
            colored.stdout
        );
    }
}

#[test]
fn source_can_arrive_on_stdin() {
    let result = run_compiler_stdin("int main() { return 7; }", &[]);
    assert!(result.ok(), "{}", result.stderr);
    assert!(result.stdout.contains("li a0, 7"), "{}", result.stdout);
}

#[test]
fn unknown_flags_exit_nonzero() {
    let result = run_compiler_stdin("int main() { return 0; }", &["--frobnicate"]);
    assert_eq!(result.status, 1);
    assert!(
        result.stderr.contains("Unknown option"),
        "{}",
        result.stderr
    );
    assert!(result.stderr.contains("Usage:"), "{}", result.stderr);
}

#[test]
fn missing_input_file_exits_nonzero() {
    let result = run_compiler_stdin("", &["/nonexistent/input.tc"]);
    assert_eq!(result.status, 1);
    assert!(
        result.stderr.contains("Cannot open file"),
        "{}",
        result.stderr
    );
}

#[test]
fn void_functions_compile_and_return_without_a_value() {
    let src = "void ping() { return; }\n\
               void pong() { }\n\
               int main() { ping(); pong(); return 0; }\n";
    let result = run_compiler("codegen", src, "void_fns.tc", &[]);
    assert!(result.ok(), "{}", result.stderr);
    assert!(result.stdout.contains("call ping"));
    assert!(result.stdout.contains("call pong"));
}
