use crate::ast::{BinOp, Expr, Function, Program, RetKind, Stmt, UnOp};
use crate::error::{CompileError, Diagnostics, ErrorKind};
use crate::span::Span;
use rustc_hash::FxHashMap;

/// Run semantic analysis over the whole program. The returned
/// diagnostics hold every error and warning found; the caller treats
/// the run as failed iff `has_errors()`.
pub fn typecheck(program: &Program) -> Diagnostics {
    let mut a = Analyzer {
        functions: FxHashMap::default(),
        scopes: Vec::new(),
        loop_depth: 0,
        current_ret: RetKind::Int,
        diags: Diagnostics::new(),
    };
    a.collect_functions(program);
    for func in &program.functions {
        a.check_function(func);
    }
    a.diags
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Int,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Variable,
    Parameter,
}

struct Symbol {
    kind: SymbolKind,
    span: Span,
    used: bool,
}

struct FuncInfo {
    ret: RetKind,
    arity: usize,
    span: Span,
}

struct Analyzer {
    functions: FxHashMap<String, FuncInfo>,
    scopes: Vec<FxHashMap<String, Symbol>>,
    loop_depth: usize,
    current_ret: RetKind,
    diags: Diagnostics,
}

impl Analyzer {
    // Pass 1: signatures into the top scope, then the `main` contract.
    fn collect_functions(&mut self, program: &Program) {
        for func in &program.functions {
            if self.functions.contains_key(&func.name) {
                self.diags.error(CompileError::new_with_span(
                    ErrorKind::RedefinedFunction,
                    format!("Function '{}' is already defined", func.name),
                    func.span,
                ));
                continue;
            }
            self.functions.insert(
                func.name.clone(),
                FuncInfo {
                    ret: func.ret,
                    arity: func.params.len(),
                    span: func.span,
                },
            );
        }

        match self.functions.get("main") {
            None => self.diags.error(CompileError::new(
                ErrorKind::UndefinedFunction,
                "Missing 'main' function",
            )),
            Some(info) => {
                if info.ret != RetKind::Int || info.arity != 0 {
                    let span = info.span;
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::TypeMismatch,
                        "'main' must be declared as 'int main()'",
                        span,
                    ));
                }
            }
        }
    }

    // Pass 2: one function body at a time.
    fn check_function(&mut self, func: &Function) {
        self.current_ret = func.ret;
        self.loop_depth = 0;
        self.push_scope();
        for param in &func.params {
            if self.scopes.last().unwrap().contains_key(&param.name) {
                self.diags.error(CompileError::new_with_span(
                    ErrorKind::RedefinedVariable,
                    format!("Parameter '{}' is already defined", param.name),
                    param.span,
                ));
                continue;
            }
            self.declare(param.name.clone(), SymbolKind::Parameter, param.span);
        }
        self.check_stmt(&func.body);
        self.pop_scope();

        if func.ret == RetKind::Int && !all_paths_return(&func.body) {
            self.diags.error(CompileError::new_with_span(
                ErrorKind::MissingReturn,
                format!(
                    "Function '{}' does not return a value on every path",
                    func.name
                ),
                func.span,
            ));
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts, _) => {
                self.push_scope();
                for s in stmts {
                    self.check_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::Declare { name, init, span } => {
                // The initializer is checked before the name exists, so
                // `int x = x;` resolves against the outer scope only.
                let ty = self.check_expr(init);
                self.require_int(ty, init.span(), "initializer");
                if self.scopes.last().unwrap().contains_key(name) {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::RedefinedVariable,
                        format!("Variable '{}' is already defined in this scope", name),
                        *span,
                    ));
                } else {
                    self.declare(name.clone(), SymbolKind::Variable, *span);
                }
            }
            Stmt::Assign { name, value, span } => {
                if self.resolve(name).is_none() {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::UndefinedVariable,
                        format!("Assignment to undefined variable '{}'", name),
                        *span,
                    ));
                }
                let ty = self.check_expr(value);
                self.require_int(ty, value.span(), "assigned value");
            }
            Stmt::Expr(expr, _) => {
                if let Some(e) = expr {
                    self.check_expr(e);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let ty = self.check_expr(condition);
                self.require_int(ty, condition.span(), "condition");
                if let Some(c) = const_eval(condition) {
                    self.diags.warning(
                        format!(
                            "Condition is always {}; the {} branch is dead",
                            if c != 0 { "true" } else { "false" },
                            if c != 0 { "else" } else { "then" }
                        ),
                        Some(condition.span()),
                    );
                }
                self.check_stmt(then_branch);
                if let Some(else_b) = else_branch {
                    self.check_stmt(else_b);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                let ty = self.check_expr(condition);
                self.require_int(ty, condition.span(), "condition");
                if const_eval(condition).is_some() {
                    self.diags.warning(
                        "Loop condition is provably constant",
                        Some(condition.span()),
                    );
                }
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            Stmt::Break(span) => {
                if self.loop_depth == 0 {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::BreakOutsideLoop,
                        "'break' outside of a loop",
                        *span,
                    ));
                }
            }
            Stmt::Continue(span) => {
                if self.loop_depth == 0 {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::ContinueOutsideLoop,
                        "'continue' outside of a loop",
                        *span,
                    ));
                }
            }
            Stmt::Return(value, span) => match (self.current_ret, value) {
                (RetKind::Void, Some(_)) => {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::ReturnValueInVoid,
                        "Void function cannot return a value",
                        *span,
                    ));
                }
                (RetKind::Int, None) => {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::InvalidReturnValue,
                        "Non-void function must return a value",
                        *span,
                    ));
                }
                (RetKind::Int, Some(e)) => {
                    let ty = self.check_expr(e);
                    self.require_int(ty, e.span(), "return value");
                }
                (RetKind::Void, None) => {}
            },
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Ty {
        match expr {
            Expr::Number { .. } => Ty::Int,
            Expr::Variable { name, span } => {
                match self.resolve_mut(name) {
                    Some(sym) => {
                        sym.used = true;
                        Ty::Int
                    }
                    None => {
                        self.diags.error(CompileError::new_with_span(
                            ErrorKind::UndefinedVariable,
                            format!("Undefined variable '{}'", name),
                            *span,
                        ));
                        // Recover as int so one bad name reports once.
                        Ty::Int
                    }
                }
            }
            Expr::Unary { expr, .. } => {
                let ty = self.check_expr(expr);
                self.require_int(ty, expr.span(), "operand");
                Ty::Int
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let lt = self.check_expr(left);
                self.require_int(lt, left.span(), "operand");
                let rt = self.check_expr(right);
                self.require_int(rt, right.span(), "operand");
                if matches!(op, BinOp::Div | BinOp::Mod) {
                    if const_eval(right) == Some(0) {
                        self.diags.error(CompileError::new_with_span(
                            ErrorKind::DivisionByZero,
                            "Division by constant zero",
                            right.span(),
                        ));
                    }
                }
                Ty::Int
            }
            Expr::Call { name, args, span } => {
                let (ret, arity) = match self.functions.get(name) {
                    Some(info) => (info.ret, info.arity),
                    None => {
                        self.diags.error(CompileError::new_with_span(
                            ErrorKind::UndefinedFunction,
                            format!("Call to undefined function '{}'", name),
                            *span,
                        ));
                        // Check the arguments anyway, then recover.
                        for arg in args {
                            self.check_expr(arg);
                        }
                        return Ty::Int;
                    }
                };
                if args.len() != arity {
                    self.diags.error(CompileError::new_with_span(
                        ErrorKind::ArgCountMismatch,
                        format!(
                            "Function '{}' expects {} argument(s), got {}",
                            name,
                            arity,
                            args.len()
                        ),
                        *span,
                    ));
                }
                for arg in args {
                    let ty = self.check_expr(arg);
                    self.require_int(ty, arg.span(), "argument");
                }
                match ret {
                    RetKind::Int => Ty::Int,
                    RetKind::Void => Ty::Void,
                }
            }
        }
    }

    fn require_int(&mut self, ty: Ty, span: Span, what: &str) {
        if ty != Ty::Int {
            self.diags.error(CompileError::new_with_span(
                ErrorKind::TypeMismatch,
                format!("The {} must have type 'int', found 'void'", what),
                span,
            ));
        }
    }

    // ---- scopes ----

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        let scope = self.scopes.pop().unwrap();
        let mut unused: Vec<(String, Span)> = scope
            .into_iter()
            .filter(|(_, sym)| sym.kind == SymbolKind::Variable && !sym.used)
            .map(|(name, sym)| (name, sym.span))
            .collect();
        // Hash order is not report order.
        unused.sort_by_key(|(_, span)| span.start);
        for (name, span) in unused {
            self.diags
                .warning(format!("Variable '{}' is never used", name), Some(span));
        }
    }

    fn declare(&mut self, name: String, kind: SymbolKind, span: Span) {
        self.scopes.last_mut().unwrap().insert(
            name,
            Symbol {
                kind,
                span,
                used: false,
            },
        );
    }

    fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn resolve_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }
}

/// Structural definite-return test: a `return` terminates, a block
/// terminates iff its last statement does, an `if` iff both arms do.
fn all_paths_return(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(..) => true,
        Stmt::Block(stmts, _) => stmts.last().map_or(false, all_paths_return),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_b) => all_paths_return(then_branch) && all_paths_return(else_b),
            None => false,
        },
        _ => false,
    }
}

/// Best-effort literal evaluation, shared by the divide-by-zero check
/// and the constant-condition warnings. No name resolution.
pub fn const_eval(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Number { value, .. } => Some(*value),
        Expr::Unary { op, expr, .. } => {
            let v = const_eval(expr)?;
            Some(match op {
                UnOp::Plus => v,
                UnOp::Neg => v.wrapping_neg(),
                UnOp::LogicNot => (v == 0) as i32,
            })
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let l = const_eval(left)?;
            let r = const_eval(right)?;
            Some(match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_div(r)
                }
                BinOp::Mod => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_rem(r)
                }
                BinOp::Lt => (l < r) as i32,
                BinOp::LtEq => (l <= r) as i32,
                BinOp::Gt => (l > r) as i32,
                BinOp::GtEq => (l >= r) as i32,
                BinOp::Eq => (l == r) as i32,
                BinOp::NotEq => (l != r) as i32,
                BinOp::LogicAnd => (l != 0 && r != 0) as i32,
                BinOp::LogicOr => (l != 0 || r != 0) as i32,
            })
        }
        _ => None,
    }
}
