mod common;

use common::run_compiler;

#[test]
fn arithmetic_folds_to_a_single_constant() {
    let src = "int main() { return 1+2*3-4/2; }";
    let result = run_compiler("opt", src, "fold.tc", &["-opt"]);
    assert!(result.ok(), "{}", result.stderr);
    assert!(
        result.stdout.contains("li a0, 5"),
        "1+2*3-4/2 folds to 5:\n{}",
        result.stdout
    );
}

#[test]
fn optimized_loops_still_loop() {
    let src = "int main(){ int s=0; int i=0; while(i<10){ i=i+1; if(i==5) continue; if(i==8) break; s=s+i; } return s; }";
    let result = run_compiler("opt", src, "loop.tc", &["-opt"]);
    assert!(result.ok(), "{}", result.stderr);
    assert!(result.stdout.contains("slt"), "{}", result.stdout);
    assert!(result.stdout.contains("bnez"), "{}", result.stdout);
}

#[test]
fn optimization_keeps_live_calls_and_their_symbols() {
    let src = "int side(int x){ return x; }\n\
               int main(){ int a = side(3); return a; }";
    let plain = run_compiler("opt", src, "symbols.tc", &[]);
    let opt = run_compiler("opt", src, "symbols.tc", &["-opt"]);
    assert!(plain.ok() && opt.ok());
    for asm in [&plain.stdout, &opt.stdout] {
        assert!(asm.contains(".global main"), "{}", asm);
        assert!(asm.contains(".global side"), "{}", asm);
        assert!(asm.contains("call side"), "{}", asm);
    }
}

#[test]
fn inlining_absorbs_small_callees() {
    let src = "int add(int a,int b){ return a+b; }\n\
               int main(){ return add(7,35); }";
    let result = run_compiler("opt", src, "inline.tc", &["-opt", "-inline"]);
    assert!(result.ok(), "{}", result.stderr);
    assert!(
        !result.stdout.contains("call add"),
        "the call is gone:\n{}",
        result.stdout
    );
    assert!(
        !result.stdout.contains(".global add"),
        "the unused callee is gone:\n{}",
        result.stdout
    );
    assert!(
        result.stdout.contains("li a0, 42"),
        "the inlined body folds:\n{}",
        result.stdout
    );
}

#[test]
fn inlining_is_off_without_the_flag() {
    let src = "int add(int a,int b){ return a+b; }\n\
               int main(){ return add(7,35); }";
    let result = run_compiler("opt", src, "no_inline.tc", &["-opt"]);
    assert!(result.ok());
    assert!(
        result.stdout.contains("call add"),
        "-opt alone must not inline:\n{}",
        result.stdout
    );
}

#[test]
fn dump_ir_prints_three_address_code_to_stderr() {
    let src = "int main() { return 2+3; }";
    let result = run_compiler("opt", src, "dump.tc", &["-opt", "-dump-ir"]);
    assert!(result.ok());
    assert!(
        result.stderr.contains("FUNCTION_BEGIN int main"),
        "{}",
        result.stderr
    );
    assert!(result.stderr.contains("RETURN"), "{}", result.stderr);
    assert!(
        !result.stdout.contains("FUNCTION_BEGIN"),
        "the dump must not contaminate the assembly:\n{}",
        result.stdout
    );
}

#[test]
fn dead_functions_survive_without_opt_and_fall_with_it() {
    let src = "int orphan() { return 9; }\n\
               int main() { return 1; }";
    let plain = run_compiler("opt", src, "orphan.tc", &[]);
    let opt = run_compiler("opt", src, "orphan.tc", &["-opt"]);
    assert!(plain.ok() && opt.ok());
    assert!(plain.stdout.contains(".global orphan"), "{}", plain.stdout);
    assert!(
        !opt.stdout.contains(".global orphan"),
        "functions unreachable from main are deleted under -opt:\n{}",
        opt.stdout
    );
}
