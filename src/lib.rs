pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod optimizer;
pub mod parser;
pub mod span;
pub mod typecheck;

use codegen::CodegenConfig;
use error::Diagnostics;

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Run the optimizer suite (`-opt`).
    pub optimize: bool,
    /// Gate the small-function inlining pass (off unless `-inline`).
    pub inline: bool,
    /// Print the (possibly optimized) IR for inspection.
    pub dump_ir: bool,
    pub codegen: CodegenConfig,
}

pub struct Compiled {
    pub assembly: String,
    /// Non-fatal findings from the front end.
    pub warnings: Diagnostics,
    pub ir_dump: Option<String>,
}

/// Compile one source string to RV32IM assembly text. Errors from any
/// phase come back as the accumulated diagnostics of that phase.
pub fn compile(src: &str, options: &Options) -> Result<Compiled, Diagnostics> {
    let tokens = lexer::lex(src).map_err(Diagnostics::from)?;
    let ast = parser::parse(&tokens)?;

    let diags = typecheck::typecheck(&ast);
    if diags.has_errors() {
        return Err(diags);
    }
    let warnings = Diagnostics {
        errors: Vec::new(),
        warnings: diags.warnings,
    };

    let mut program = lower::lower(&ast);
    ir::validate(&program).map_err(Diagnostics::from)?;

    if options.optimize {
        optimizer::optimize(&mut program, options.inline);
        ir::validate(&program).map_err(Diagnostics::from)?;
    }

    let ir_dump = options.dump_ir.then(|| program.to_string());
    let assembly = codegen::generate(&program, &options.codegen).map_err(Diagnostics::from)?;

    Ok(Compiled {
        assembly,
        warnings,
        ir_dump,
    })
}
