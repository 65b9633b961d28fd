use crate::ast::{BinOp, Expr, Function, Program, RetKind, Stmt, UnOp};
use crate::ir::{Instr, IrProgram, Op, Val};
use rustc_hash::FxHashMap;

/// Lower a checked AST into the flat three-address program. Label
/// numbers are fresh across the whole unit, temporaries per function.
pub fn lower(program: &Program) -> IrProgram {
    let mut ret_kinds = FxHashMap::default();
    for func in &program.functions {
        ret_kinds.insert(func.name.clone(), func.ret);
    }

    let mut instrs = Vec::new();
    let mut label_counter = 0;
    for func in &program.functions {
        let mut builder = IrBuilder::new(&mut instrs, &mut label_counter, &ret_kinds);
        builder.lower_function(func);
    }
    IrProgram { instrs }
}

struct IrBuilder<'a> {
    instrs: &'a mut Vec<Instr>,
    label_counter: &'a mut usize,
    ret_kinds: &'a FxHashMap<String, RetKind>,
    temp_counter: usize,
    scope_depth: usize,
    // Innermost-last mapping of source names to qualified operand names.
    scopes: Vec<FxHashMap<String, String>>,
    // (break target, continue target) of the enclosing loops.
    loop_stack: Vec<(String, String)>,
}

impl<'a> IrBuilder<'a> {
    fn new(
        instrs: &'a mut Vec<Instr>,
        label_counter: &'a mut usize,
        ret_kinds: &'a FxHashMap<String, RetKind>,
    ) -> Self {
        Self {
            instrs,
            label_counter,
            ret_kinds,
            temp_counter: 0,
            scope_depth: 0,
            scopes: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    fn new_temp(&mut self) -> Val {
        let t = self.temp_counter;
        self.temp_counter += 1;
        Val::Temp(t)
    }

    fn new_label(&mut self) -> String {
        let l = format!("L{}", self.label_counter);
        *self.label_counter += 1;
        l
    }

    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    // ---- scopes ----

    fn push_scope(&mut self) {
        self.scope_depth += 1;
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        self.scope_depth -= 1;
    }

    /// Bind `name` in the innermost scope under its depth-qualified
    /// operand name, so shadowed declarations stay distinct in the IR.
    fn declare(&mut self, name: &str) -> Val {
        let qualified = format!("{}_scope{}", name, self.scope_depth);
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), qualified.clone());
        Val::Var(qualified)
    }

    fn lookup(&self, name: &str) -> Val {
        let qualified = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .expect("name resolved by semantic analysis");
        Val::Var(qualified.clone())
    }

    // ---- functions ----

    fn lower_function(&mut self, func: &Function) {
        self.temp_counter = 0;
        self.push_scope();

        let mut params = Vec::new();
        for param in &func.params {
            let qualified = match self.declare(&param.name) {
                Val::Var(name) => name,
                _ => unreachable!(),
            };
            params.push(qualified);
        }

        self.emit(Instr::FuncBegin {
            name: func.name.clone(),
            ret: func.ret,
            params,
        });

        self.lower_stmt(&func.body);

        // Only a void body may fall off its end; int bodies cannot once
        // the definite-return check has passed.
        if func.ret == RetKind::Void && !matches!(self.instrs.last(), Some(Instr::Return(_))) {
            self.emit(Instr::Return(None));
        }

        self.emit(Instr::FuncEnd {
            name: func.name.clone(),
        });
        self.pop_scope();
    }

    // ---- statements ----

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts, _) => {
                self.push_scope();
                for s in stmts {
                    self.lower_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::Declare { name, init, .. } => {
                let value = self.lower_expr(init);
                let dest = self.declare(name);
                self.emit(Instr::Assign { dest, src: value });
            }
            Stmt::Assign { name, value, .. } => {
                let src = self.lower_expr(value);
                let dest = self.lookup(name);
                self.emit(Instr::Assign { dest, src });
            }
            Stmt::Expr(expr, _) => {
                if let Some(e) = expr {
                    self.lower_expr(e);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let end_label = self.new_label();
                let else_label = if else_branch.is_some() {
                    self.new_label()
                } else {
                    end_label.clone()
                };

                let cond = self.lower_expr(condition);
                self.branch_if_zero(cond, &else_label);
                self.lower_stmt(then_branch);
                if let Some(else_b) = else_branch {
                    self.emit(Instr::Goto {
                        label: end_label.clone(),
                    });
                    self.emit(Instr::Label(else_label));
                    self.lower_stmt(else_b);
                }
                self.emit(Instr::Label(end_label));
            }
            Stmt::While {
                condition, body, ..
            } => {
                let cond_label = self.new_label();
                let body_label = self.new_label();
                let end_label = self.new_label();

                self.emit(Instr::Label(cond_label.clone()));
                let cond = self.lower_expr(condition);
                self.branch_if_zero(cond, &end_label);
                self.emit(Instr::Label(body_label));

                self.loop_stack
                    .push((end_label.clone(), cond_label.clone()));
                self.lower_stmt(body);
                self.loop_stack.pop();

                self.emit(Instr::Goto { label: cond_label });
                self.emit(Instr::Label(end_label));
            }
            Stmt::Break(_) => {
                let target = self.loop_stack.last().unwrap().0.clone();
                self.emit(Instr::Goto { label: target });
            }
            Stmt::Continue(_) => {
                let target = self.loop_stack.last().unwrap().1.clone();
                self.emit(Instr::Goto { label: target });
            }
            Stmt::Return(value, _) => {
                let val = value.as_ref().map(|e| self.lower_expr(e));
                self.emit(Instr::Return(val));
            }
        }
    }

    /// `IF_GOTO (v == 0) label`, expressed through the negation of v.
    fn branch_if_zero(&mut self, cond: Val, label: &str) {
        let negated = self.new_temp();
        self.emit(Instr::Not {
            dest: negated.clone(),
            src: cond,
        });
        self.emit(Instr::IfGoto {
            cond: negated,
            label: label.to_string(),
        });
    }

    // ---- expressions ----

    fn lower_expr(&mut self, expr: &Expr) -> Val {
        match expr {
            Expr::Number { value, .. } => Val::Const(*value),
            Expr::Variable { name, .. } => self.lookup(name),
            Expr::Unary { op, expr, .. } => {
                let src = self.lower_expr(expr);
                match op {
                    UnOp::Plus => src,
                    UnOp::Neg => {
                        let dest = self.new_temp();
                        self.emit(Instr::Neg {
                            dest: dest.clone(),
                            src,
                        });
                        dest
                    }
                    UnOp::LogicNot => {
                        let dest = self.new_temp();
                        self.emit(Instr::Not {
                            dest: dest.clone(),
                            src,
                        });
                        dest
                    }
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => match op {
                BinOp::LogicAnd => self.lower_short_circuit_and(left, right),
                BinOp::LogicOr => self.lower_short_circuit_or(left, right),
                _ => {
                    let l = self.lower_expr(left);
                    let r = self.lower_expr(right);
                    let dest = self.new_temp();
                    let ir_op = match op {
                        BinOp::Add => Op::Add,
                        BinOp::Sub => Op::Sub,
                        BinOp::Mul => Op::Mul,
                        BinOp::Div => Op::Div,
                        BinOp::Mod => Op::Mod,
                        BinOp::Lt => Op::Lt,
                        BinOp::LtEq => Op::Le,
                        BinOp::Gt => Op::Gt,
                        BinOp::GtEq => Op::Ge,
                        BinOp::Eq => Op::Eq,
                        BinOp::NotEq => Op::Ne,
                        BinOp::LogicAnd | BinOp::LogicOr => unreachable!(),
                    };
                    self.emit(Instr::Binary {
                        op: ir_op,
                        dest: dest.clone(),
                        left: l,
                        right: r,
                    });
                    dest
                }
            },
            Expr::Call { name, args, .. } => {
                // Arguments evaluate left to right before any PARAM is
                // queued, so a nested call cannot split the queue.
                let arg_vals: Vec<Val> = args.iter().map(|a| self.lower_expr(a)).collect();
                for value in arg_vals {
                    self.emit(Instr::Param { value });
                }
                let dest = match self.ret_kinds.get(name) {
                    Some(RetKind::Int) => Some(self.new_temp()),
                    _ => None,
                };
                self.emit(Instr::Call {
                    dest: dest.clone(),
                    func: name.clone(),
                    argc: args.len(),
                });
                // A void call in expression position is rejected by the
                // semantic analyzer; the zero placates expr statements.
                dest.unwrap_or(Val::Const(0))
            }
        }
    }

    /// `a && b` with the right operand skipped when a is zero; the
    /// result is normalized to 0 or 1.
    fn lower_short_circuit_and(&mut self, a: &Expr, b: &Expr) -> Val {
        let result = self.new_temp();
        let false_label = self.new_label();
        let end_label = self.new_label();

        let a_val = self.lower_expr(a);
        self.branch_if_zero(a_val, &false_label);

        let b_val = self.lower_expr(b);
        self.emit(Instr::Binary {
            op: Op::Ne,
            dest: result.clone(),
            left: b_val,
            right: Val::Const(0),
        });
        self.emit(Instr::Goto {
            label: end_label.clone(),
        });
        self.emit(Instr::Label(false_label));
        self.emit(Instr::Assign {
            dest: result.clone(),
            src: Val::Const(0),
        });
        self.emit(Instr::Label(end_label));
        result
    }

    /// `a || b`, symmetric to `&&` with inverted polarity.
    fn lower_short_circuit_or(&mut self, a: &Expr, b: &Expr) -> Val {
        let result = self.new_temp();
        let true_label = self.new_label();
        let end_label = self.new_label();

        let a_val = self.lower_expr(a);
        self.emit(Instr::IfGoto {
            cond: a_val,
            label: true_label.clone(),
        });

        let b_val = self.lower_expr(b);
        self.emit(Instr::Binary {
            op: Op::Ne,
            dest: result.clone(),
            left: b_val,
            right: Val::Const(0),
        });
        self.emit(Instr::Goto {
            label: end_label.clone(),
        });
        self.emit(Instr::Label(true_label));
        self.emit(Instr::Assign {
            dest: result.clone(),
            src: Val::Const(1),
        });
        self.emit(Instr::Label(end_label));
        result
    }
}
