mod common;

use common::run_compiler;

fn run(source: &str, file_name: &str) -> common::RunResult {
    run_compiler("parse_errors", source, file_name, &[])
}

#[test]
fn missing_semicolon_fails_with_position() {
    let src = "int main() {\n  return 42\n}\n";
    let result = run(src, "missing_semi.tc");
    assert!(!result.ok(), "parse must fail");
    assert!(
        result.stderr.contains("error[missing token]"),
        "missing-token diagnostic expected:\n{}",
        result.stderr
    );
    assert!(
        result.stderr.contains("line 3"),
        "the closing brace is the offending token:\n{}",
        result.stderr
    );
}

#[test]
fn several_errors_surface_in_one_run() {
    let src = "int main() {\n  int x = ;\n  int y = ;\n  return 0;\n}\n";
    let result = run(src, "two_bad_inits.tc");
    assert!(!result.ok());
    let count = result.stderr.matches("error[").count();
    assert!(
        count >= 2,
        "expected both initializers to be reported, got {}:\n{}",
        count,
        result.stderr
    );
}

#[test]
fn invalid_return_type_is_rejected() {
    let src = "float main() { return 0; }\n";
    let result = run(src, "bad_ret_type.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("error[invalid return type]"),
        "{}",
        result.stderr
    );
}

#[test]
fn unterminated_block_comment_is_a_lex_error() {
    let src = "int main() { return 0; } /* trailing\n";
    let result = run(src, "open_comment.tc");
    assert!(!result.ok());
    assert!(
        result.stderr.contains("Unterminated block comment"),
        "{}",
        result.stderr
    );
}

#[test]
fn empty_parameter_lists_and_comments_parse() {
    let src = "// line comment\n\
               /* block\n   comment */\n\
               int f() { return 1; }\n\
               int main() { return f(); }\n";
    let result = run(src, "comments.tc");
    assert!(result.ok(), "stderr: {}", result.stderr);
}

#[test]
fn assignment_needs_a_declared_target_token() {
    // `IDENT =` must parse as an assignment, not an expression.
    let src = "int main() { int x = 1; x = x + 1; return x; }\n";
    let result = run(src, "assign_stmt.tc");
    assert!(result.ok(), "stderr: {}", result.stderr);
}
