mod common;

use common::run_compiler;

fn run(source: &str, file_name: &str) -> common::RunResult {
    run_compiler("semantic_errors", source, file_name, &[])
}

#[test]
fn missing_main_must_fail() {
    let src = "int f() { return 1; }\n";
    let result = run(src, "no_main.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("Missing 'main' function"),
        "{}",
        result.stderr
    );
}

#[test]
fn main_signature_is_enforced() {
    let src = "int main(int argc) { return argc; }\n";
    let result = run(src, "main_with_params.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("'main' must be declared as 'int main()'"),
        "{}",
        result.stderr
    );
}

#[test]
fn break_outside_loop_must_fail() {
    let src = "int main() { break; return 0; }\n";
    let result = run(src, "stray_break.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[break outside loop]"),
        "{}",
        result.stderr
    );
}

#[test]
fn continue_outside_loop_must_fail() {
    let src = "int main() { if (1 < 2) { continue; } return 0; }\n";
    let result = run(src, "stray_continue.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[continue outside loop]"),
        "{}",
        result.stderr
    );
}

#[test]
fn arity_mismatch_must_fail() {
    let src = "int add(int a, int b) { return a + b; }\n\
               int main() { return add(1); }\n";
    let result = run(src, "arity.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("expects 2 argument(s), got 1"),
        "{}",
        result.stderr
    );
}

#[test]
fn bare_return_in_int_function_must_fail() {
    let src = "int main() { return; }\n";
    let result = run(src, "bare_return.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[invalid return value]"),
        "{}",
        result.stderr
    );
}

#[test]
fn value_return_in_void_function_must_fail() {
    let src = "void f() { return 1; }\n\
               int main() { f(); return 0; }\n";
    let result = run(src, "void_value.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[return value in void function]"),
        "{}",
        result.stderr
    );
}

#[test]
fn missing_return_on_a_path_must_fail() {
    let src = "int f(int c) { if (c) { return 1; } }\n\
               int main() { return f(0); }\n";
    let result = run(src, "missing_return.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[missing return]"),
        "{}",
        result.stderr
    );
}

#[test]
fn redefinition_in_one_scope_must_fail() {
    let src = "int main() { int x = 1; int x = 2; return x; }\n";
    let result = run(src, "redefined.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[redefined variable]"),
        "{}",
        result.stderr
    );
}

#[test]
fn shadowing_in_a_nested_block_is_legal() {
    let src = "int main() { int x = 1; { int x = 2; x = x + 1; } return x; }\n";
    let result = run(src, "shadowing.tc");
    assert!(result.ok(), "stderr: {}", result.stderr);
}

#[test]
fn undefined_names_must_fail() {
    let src = "int main() { y = 1; return g(); }\n";
    let result = run(src, "undefined.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[undefined variable]"),
        "{}",
        result.stderr
    );
    assert!(
        result.stderr.contains("error[undefined function]"),
        "{}",
        result.stderr
    );
}

#[test]
fn void_call_is_not_an_int_value() {
    let src = "void f() { return; }\n\
               int main() { int x = f(); return x; }\n";
    let result = run(src, "void_value_use.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[type mismatch]"),
        "{}",
        result.stderr
    );
}

#[test]
fn literal_divide_by_zero_is_diagnosed() {
    let src = "int main() { return 1 / 0; }\n";
    let result = run(src, "div_zero.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[division by zero]"),
        "{}",
        result.stderr
    );
}

#[test]
fn one_run_reports_several_semantic_errors() {
    let src = "int main() {\n\
                 break;\n\
                 y = 1;\n\
                 int x = 1;\n\
                 int x = 2;\n\
                 return x;\n\
               }\n";
    let result = run(src, "many.tc");
    assert!(!result.ok());
    let count = result.stderr.matches("error[").count();
    assert!(
        count >= 3,
        "expected break, undefined and redefinition together, got {}:\n{}",
        count,
        result.stderr
    );
}

#[test]
fn unused_variable_warns_without_failing() {
    let src = "int main() { int x = 1; return 0; }\n";
    let result = run(src, "unused.tc");
    assert!(result.ok(), "warnings are not fatal: {}", result.stderr);
    assert!(
        result.stderr.contains("warning: Variable 'x' is never used"),
        "{}",
        result.stderr
    );

    let silenced = run_compiler("semantic_errors", src, "unused_w.tc", &["-w"]);
    assert!(silenced.ok());
    assert!(
        !silenced.stderr.contains("warning:"),
        "-w must silence warnings: {}",
        silenced.stderr
    );
}
