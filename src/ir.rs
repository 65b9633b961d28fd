use crate::ast::RetKind;
use crate::error::CompileError;
use rustc_hash::FxHashMap;
use std::fmt;

/// Three-address operand. Two operands are the same value iff their
/// (kind, name/value) match; `name()` is the projection the dataflow
/// passes and the allocators key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Val {
    Const(i32),
    Var(String),
    Temp(usize),
}

impl Val {
    pub fn name(&self) -> Option<String> {
        match self {
            Val::Const(_) => None,
            Val::Var(name) => Some(name.clone()),
            Val::Temp(t) => Some(format!("t{}", t)),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Val::Const(_))
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Const(v) => write!(f, "{}", v),
            Val::Var(name) => write!(f, "{}", name),
            Val::Temp(t) => write!(f, "t{}", t),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::Le => "LE",
            Op::Ge => "GE",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::And => "AND",
            Op::Or => "OR",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Instr {
    Binary {
        op: Op,
        dest: Val,
        left: Val,
        right: Val,
    },
    Neg {
        dest: Val,
        src: Val,
    },
    Not {
        dest: Val,
        src: Val,
    },
    Assign {
        dest: Val,
        src: Val,
    },
    Goto {
        label: String,
    },
    /// Branch to `label` iff `cond` is non-zero; falls through otherwise.
    IfGoto {
        cond: Val,
        label: String,
    },
    /// Enqueue one argument for the next Call.
    Param {
        value: Val,
    },
    Call {
        dest: Option<Val>,
        func: String,
        argc: usize,
    },
    Return(Option<Val>),
    Label(String),
    FuncBegin {
        name: String,
        ret: RetKind,
        params: Vec<String>,
    },
    FuncEnd {
        name: String,
    },
}

impl Instr {
    /// Name defined by this instruction, if any. Labels and function
    /// names are not operands.
    pub fn def(&self) -> Option<String> {
        match self {
            Instr::Binary { dest, .. }
            | Instr::Neg { dest, .. }
            | Instr::Not { dest, .. }
            | Instr::Assign { dest, .. } => dest.name(),
            Instr::Call { dest: Some(d), .. } => d.name(),
            _ => None,
        }
    }

    /// Names used by this instruction, in operand order.
    pub fn uses(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut push = |val: &Val| {
            if let Some(name) = val.name() {
                out.push(name);
            }
        };
        match self {
            Instr::Binary { left, right, .. } => {
                push(left);
                push(right);
            }
            Instr::Neg { src, .. } | Instr::Not { src, .. } | Instr::Assign { src, .. } => {
                push(src);
            }
            Instr::IfGoto { cond, .. } => push(cond),
            Instr::Param { value } => push(value),
            Instr::Return(Some(v)) => push(v),
            Instr::Call { .. }
            | Instr::Return(None)
            | Instr::Goto { .. }
            | Instr::Label(_)
            | Instr::FuncBegin { .. }
            | Instr::FuncEnd { .. } => {}
        }
        out
    }

    /// Apply `f` to every used operand in place.
    pub fn replace_uses<F: Fn(&Val) -> Val>(&mut self, f: F) -> bool {
        let mut changed = false;
        let mut map = |v: &mut Val| {
            let newv = f(v);
            if *v != newv {
                *v = newv;
                changed = true;
            }
        };
        match self {
            Instr::Binary { left, right, .. } => {
                map(left);
                map(right);
            }
            Instr::Neg { src, .. } | Instr::Not { src, .. } | Instr::Assign { src, .. } => {
                map(src);
            }
            Instr::IfGoto { cond, .. } => map(cond),
            Instr::Param { value } => map(value),
            Instr::Return(v) => {
                if let Some(x) = v {
                    map(x);
                }
            }
            Instr::Call { .. }
            | Instr::Goto { .. }
            | Instr::Label(_)
            | Instr::FuncBegin { .. }
            | Instr::FuncEnd { .. } => {}
        }
        changed
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Binary {
                op,
                dest,
                left,
                right,
            } => write!(f, "  {} = {} {} {}", dest, left, op.mnemonic(), right),
            Instr::Neg { dest, src } => write!(f, "  {} = NEG {}", dest, src),
            Instr::Not { dest, src } => write!(f, "  {} = NOT {}", dest, src),
            Instr::Assign { dest, src } => write!(f, "  {} = {}", dest, src),
            Instr::Goto { label } => write!(f, "  GOTO {}", label),
            Instr::IfGoto { cond, label } => write!(f, "  IF {} GOTO {}", cond, label),
            Instr::Param { value } => write!(f, "  PARAM {}", value),
            Instr::Call { dest, func, argc } => match dest {
                Some(d) => write!(f, "  {} = CALL {}, {}", d, func, argc),
                None => write!(f, "  CALL {}, {}", func, argc),
            },
            Instr::Return(v) => match v {
                Some(v) => write!(f, "  RETURN {}", v),
                None => write!(f, "  RETURN"),
            },
            Instr::Label(name) => write!(f, "{}:", name),
            Instr::FuncBegin { name, ret, params } => {
                let ret = match ret {
                    RetKind::Int => "int",
                    RetKind::Void => "void",
                };
                write!(f, "FUNCTION_BEGIN {} {} ({})", ret, name, params.join(", "))
            }
            Instr::FuncEnd { name } => write!(f, "FUNCTION_END {}", name),
        }
    }
}

/// A whole compilation unit: one flat instruction sequence in which
/// functions are delimited by matching FuncBegin/FuncEnd pairs.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub instrs: Vec<Instr>,
}

impl IrProgram {
    /// (begin, end) index pairs, one per function; `begin` is the
    /// FuncBegin, `end` the matching FuncEnd.
    pub fn function_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut begin = None;
        for (i, instr) in self.instrs.iter().enumerate() {
            match instr {
                Instr::FuncBegin { .. } => begin = Some(i),
                Instr::FuncEnd { .. } => {
                    if let Some(b) = begin.take() {
                        ranges.push((b, i));
                    }
                }
                _ => {}
            }
        }
        ranges
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

/// Structural well-formedness, checked after lowering and again after
/// every optimizer run:
/// - FuncBegin/FuncEnd strictly paired, nothing outside a function;
/// - every referenced label defined exactly once in its function;
/// - every Call's argc equals the Params queued since the previous
///   Call or FuncBegin.
pub fn validate(program: &IrProgram) -> Result<(), CompileError> {
    let mut current: Option<&str> = None;
    let mut labels: FxHashMap<&str, usize> = FxHashMap::default();
    let mut refs: Vec<&str> = Vec::new();
    let mut pending_params = 0usize;

    for instr in &program.instrs {
        if current.is_none() && !matches!(instr, Instr::FuncBegin { .. }) {
            return Err(CompileError::internal(format!(
                "Instruction outside of a function: {}",
                instr
            )));
        }
        match instr {
            Instr::FuncBegin { name, .. } => {
                if current.is_some() {
                    return Err(CompileError::internal(format!(
                        "Nested FUNCTION_BEGIN {}",
                        name
                    )));
                }
                current = Some(name.as_str());
                labels.clear();
                refs.clear();
                pending_params = 0;
            }
            Instr::FuncEnd { name } => {
                if current != Some(name.as_str()) {
                    return Err(CompileError::internal(format!(
                        "Mismatched FUNCTION_END {}",
                        name
                    )));
                }
                for label in &refs {
                    match labels.get(label) {
                        Some(1) => {}
                        Some(n) => {
                            return Err(CompileError::internal(format!(
                                "Label {} defined {} times in {}",
                                label, n, name
                            )));
                        }
                        None => {
                            return Err(CompileError::internal(format!(
                                "Label {} referenced but not defined in {}",
                                label, name
                            )));
                        }
                    }
                }
                for (label, n) in &labels {
                    if *n > 1 {
                        return Err(CompileError::internal(format!(
                            "Label {} defined {} times in {}",
                            label, n, name
                        )));
                    }
                }
                current = None;
            }
            Instr::Label(name) => {
                *labels.entry(name.as_str()).or_insert(0) += 1;
            }
            Instr::Goto { label } => refs.push(label.as_str()),
            Instr::IfGoto { label, .. } => refs.push(label.as_str()),
            Instr::Param { .. } => pending_params += 1,
            Instr::Call { func, argc, .. } => {
                if pending_params != *argc {
                    return Err(CompileError::internal(format!(
                        "Call to {} expects {} param(s), {} queued",
                        func, argc, pending_params
                    )));
                }
                pending_params = 0;
            }
            _ => {}
        }
    }
    if let Some(name) = current {
        return Err(CompileError::internal(format!(
            "FUNCTION_BEGIN {} without FUNCTION_END",
            name
        )));
    }
    Ok(())
}
