use crate::ir::{Instr, IrProgram, Op, Val};
use rustc_hash::{FxHashMap, FxHashSet};

const MAX_ROUNDS: usize = 8;
const INLINE_THRESHOLD: usize = 24;

/// Run the whole pass suite over the program to a fixed point (bounded).
/// Inlining participates only when `inline_enabled` is set.
pub fn optimize(program: &mut IrProgram, inline_enabled: bool) {
    let mut funcs = split_functions(std::mem::take(&mut program.instrs));
    let mut labels = LabelAlloc::scan(&funcs);
    let mut inline_counter = 0usize;

    let mut changed = true;
    let mut rounds = 0;
    while changed && rounds < MAX_ROUNDS {
        changed = false;
        for func in funcs.iter_mut() {
            changed |= const_fold(func);
            changed |= const_propagation(func);
            changed |= copy_propagation(func);
            changed |= local_cse(func);
            changed |= dead_code_elim(func);
            changed |= licm(func, &mut labels);
            changed |= cleanup(func);
        }
        if inline_enabled {
            changed |= inline_small_functions(&mut funcs, &mut labels, &mut inline_counter);
        }
        rounds += 1;
    }

    remove_unused_functions(&mut funcs);
    program.instrs = funcs.into_iter().flatten().collect();
}

fn split_functions(instrs: Vec<Instr>) -> Vec<Vec<Instr>> {
    let mut funcs = Vec::new();
    let mut current = Vec::new();
    for instr in instrs {
        let is_end = matches!(instr, Instr::FuncEnd { .. });
        current.push(instr);
        if is_end {
            funcs.push(std::mem::take(&mut current));
        }
    }
    funcs
}

/// Fresh `L<k>` labels continuing past every number already in use.
struct LabelAlloc {
    next: usize,
}

impl LabelAlloc {
    fn scan(funcs: &[Vec<Instr>]) -> Self {
        let mut next = 0;
        for func in funcs {
            for instr in func {
                if let Instr::Label(name) = instr {
                    if let Some(n) = name.strip_prefix('L').and_then(|s| s.parse::<usize>().ok())
                    {
                        next = next.max(n + 1);
                    }
                }
            }
        }
        LabelAlloc { next }
    }

    fn fresh(&mut self) -> String {
        let l = format!("L{}", self.next);
        self.next += 1;
        l
    }
}

fn is_pure(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::Binary { .. } | Instr::Neg { .. } | Instr::Not { .. } | Instr::Assign { .. }
    )
}

// ==================== basic blocks / CFG ====================

struct Block {
    start: usize,
    end: usize, // exclusive
    succs: Vec<usize>,
    preds: Vec<usize>,
}

struct Cfg {
    blocks: Vec<Block>,
}

impl Cfg {
    fn block_of_instr(&self, idx: usize) -> usize {
        self.blocks
            .iter()
            .position(|b| b.start <= idx && idx < b.end)
            .unwrap()
    }
}

/// Leaders: the first instruction, every label, and the instruction
/// after any terminator. Rebuilt from the flat list on demand.
fn build_cfg(instrs: &[Instr]) -> Cfg {
    let mut leaders = FxHashSet::default();
    if !instrs.is_empty() {
        leaders.insert(0);
    }
    for (i, instr) in instrs.iter().enumerate() {
        match instr {
            Instr::Label(_) => {
                leaders.insert(i);
            }
            Instr::Goto { .. } | Instr::IfGoto { .. } | Instr::Return(_) => {
                if i + 1 < instrs.len() {
                    leaders.insert(i + 1);
                }
            }
            _ => {}
        }
    }

    let mut starts: Vec<usize> = leaders.into_iter().collect();
    starts.sort_unstable();

    let mut blocks: Vec<Block> = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(instrs.len());
        blocks.push(Block {
            start,
            end,
            succs: Vec::new(),
            preds: Vec::new(),
        });
    }

    let mut label_block: FxHashMap<&str, usize> = FxHashMap::default();
    for (bi, block) in blocks.iter().enumerate() {
        if let Some(Instr::Label(name)) = instrs.get(block.start) {
            label_block.insert(name.as_str(), bi);
        }
    }

    let nblocks = blocks.len();
    for bi in 0..nblocks {
        let last = blocks[bi].end - 1;
        let mut succs = Vec::new();
        match &instrs[last] {
            Instr::Goto { label } => {
                if let Some(&t) = label_block.get(label.as_str()) {
                    succs.push(t);
                }
            }
            Instr::IfGoto { label, .. } => {
                if let Some(&t) = label_block.get(label.as_str()) {
                    succs.push(t);
                }
                if bi + 1 < nblocks {
                    succs.push(bi + 1);
                }
            }
            Instr::Return(_) | Instr::FuncEnd { .. } => {}
            _ => {
                if bi + 1 < nblocks {
                    succs.push(bi + 1);
                }
            }
        }
        blocks[bi].succs = succs;
    }
    for bi in 0..nblocks {
        let succs = blocks[bi].succs.clone();
        for s in succs {
            blocks[s].preds.push(bi);
        }
    }
    Cfg { blocks }
}

// ==================== constant folding ====================

fn eval_binary(op: Op, l: i32, r: i32) -> Option<i32> {
    Some(match op {
        Op::Add => l.wrapping_add(r),
        Op::Sub => l.wrapping_sub(r),
        Op::Mul => l.wrapping_mul(r),
        // Division and modulo by zero are preserved as runtime traps.
        Op::Div => {
            if r == 0 {
                return None;
            }
            l.wrapping_div(r)
        }
        Op::Mod => {
            if r == 0 {
                return None;
            }
            l.wrapping_rem(r)
        }
        Op::Lt => (l < r) as i32,
        Op::Gt => (l > r) as i32,
        Op::Le => (l <= r) as i32,
        Op::Ge => (l >= r) as i32,
        Op::Eq => (l == r) as i32,
        Op::Ne => (l != r) as i32,
        Op::And => (l != 0 && r != 0) as i32,
        Op::Or => (l != 0 || r != 0) as i32,
    })
}

fn const_fold(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;
    let mut out: Vec<Instr> = Vec::with_capacity(instrs.len());

    for instr in instrs.drain(..) {
        let folded = match instr {
            Instr::Binary {
                op,
                dest,
                left,
                right,
            } => match (&left, &right) {
                (Val::Const(l), Val::Const(r)) => match eval_binary(op, *l, *r) {
                    Some(v) => {
                        changed = true;
                        Instr::Assign {
                            dest,
                            src: Val::Const(v),
                        }
                    }
                    None => Instr::Binary {
                        op,
                        dest,
                        left,
                        right,
                    },
                },
                // A few identities the folder proper cannot reach.
                (x, Val::Const(0)) if matches!(op, Op::Add | Op::Sub) => {
                    changed = true;
                    Instr::Assign {
                        dest,
                        src: x.clone(),
                    }
                }
                (Val::Const(0), x) if op == Op::Add => {
                    changed = true;
                    Instr::Assign {
                        dest,
                        src: x.clone(),
                    }
                }
                (x, Val::Const(1)) if matches!(op, Op::Mul | Op::Div) => {
                    changed = true;
                    Instr::Assign {
                        dest,
                        src: x.clone(),
                    }
                }
                (Val::Const(1), x) if op == Op::Mul => {
                    changed = true;
                    Instr::Assign {
                        dest,
                        src: x.clone(),
                    }
                }
                (_, Val::Const(0)) | (Val::Const(0), _) if op == Op::Mul => {
                    changed = true;
                    Instr::Assign {
                        dest,
                        src: Val::Const(0),
                    }
                }
                _ => Instr::Binary {
                    op,
                    dest,
                    left,
                    right,
                },
            },
            Instr::Neg {
                dest,
                src: Val::Const(v),
            } => {
                changed = true;
                Instr::Assign {
                    dest,
                    src: Val::Const(v.wrapping_neg()),
                }
            }
            Instr::Not {
                dest,
                src: Val::Const(v),
            } => {
                changed = true;
                Instr::Assign {
                    dest,
                    src: Val::Const((v == 0) as i32),
                }
            }
            Instr::IfGoto {
                cond: Val::Const(v),
                label,
            } => {
                changed = true;
                if v != 0 {
                    Instr::Goto { label }
                } else {
                    continue;
                }
            }
            other => other,
        };
        out.push(folded);
    }

    *instrs = out;
    changed
}

// ==================== constant propagation ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fact {
    Const(i32),
    Nac,
}

type Env = FxHashMap<String, Fact>;

fn fact_of(env: &Env, val: &Val) -> Option<Fact> {
    match val {
        Val::Const(c) => Some(Fact::Const(*c)),
        _ => val.name().and_then(|n| env.get(&n).copied()),
    }
}

/// One instruction's effect on the fact map. Facts die wholesale at a
/// call; callees may not be pure.
fn transfer(env: &mut Env, instr: &Instr) {
    match instr {
        Instr::Assign { dest, src } => {
            let fact = fact_of(env, src);
            set_fact(env, dest, fact);
        }
        Instr::Binary {
            op,
            dest,
            left,
            right,
        } => {
            let fact = match (fact_of(env, left), fact_of(env, right)) {
                (Some(Fact::Const(l)), Some(Fact::Const(r))) => match eval_binary(*op, l, r) {
                    Some(v) => Some(Fact::Const(v)),
                    None => Some(Fact::Nac),
                },
                (Some(Fact::Nac), _) | (_, Some(Fact::Nac)) => Some(Fact::Nac),
                _ => None,
            };
            set_fact(env, dest, fact);
        }
        Instr::Neg { dest, src } => {
            let fact = match fact_of(env, src) {
                Some(Fact::Const(v)) => Some(Fact::Const(v.wrapping_neg())),
                other => other,
            };
            set_fact(env, dest, fact);
        }
        Instr::Not { dest, src } => {
            let fact = match fact_of(env, src) {
                Some(Fact::Const(v)) => Some(Fact::Const((v == 0) as i32)),
                other => other,
            };
            set_fact(env, dest, fact);
        }
        Instr::Call { dest, .. } => {
            for fact in env.values_mut() {
                *fact = Fact::Nac;
            }
            if let Some(d) = dest {
                set_fact(env, d, Some(Fact::Nac));
            }
        }
        _ => {}
    }
}

fn set_fact(env: &mut Env, dest: &Val, fact: Option<Fact>) {
    if let Some(name) = dest.name() {
        match fact {
            Some(f) => {
                env.insert(name, f);
            }
            None => {
                env.remove(&name);
            }
        }
    }
}

/// Meet `out` into a successor's in-set. Absent keys are ⊤; the lattice
/// only ever descends ⊤ → const → ⊥, so this terminates.
fn meet_into(target: &mut Option<Env>, out: &Env) -> bool {
    match target {
        None => {
            *target = Some(out.clone());
            true
        }
        Some(t) => {
            let mut changed = false;
            for (name, fact) in out {
                match t.get(name) {
                    None => {
                        t.insert(name.clone(), *fact);
                        changed = true;
                    }
                    Some(existing) if existing == fact => {}
                    Some(Fact::Nac) => {}
                    Some(_) => {
                        t.insert(name.clone(), Fact::Nac);
                        changed = true;
                    }
                }
            }
            changed
        }
    }
}

fn const_propagation(instrs: &mut Vec<Instr>) -> bool {
    let cfg = build_cfg(instrs);
    let nblocks = cfg.blocks.len();

    // Parameters are defined by the caller.
    let mut entry = Env::default();
    if let Some(Instr::FuncBegin { params, .. }) = instrs.first() {
        for p in params {
            entry.insert(p.clone(), Fact::Nac);
        }
    }

    let mut ins: Vec<Option<Env>> = vec![None; nblocks];
    ins[0] = Some(entry);
    let mut worklist = vec![0usize];
    while let Some(b) = worklist.pop() {
        let mut env = match &ins[b] {
            Some(env) => env.clone(),
            None => continue,
        };
        for instr in &instrs[cfg.blocks[b].start..cfg.blocks[b].end] {
            transfer(&mut env, instr);
        }
        for &s in &cfg.blocks[b].succs {
            if meet_into(&mut ins[s], &env) {
                worklist.push(s);
            }
        }
    }

    // Rewrite uses with the facts valid at each point.
    let mut changed = false;
    for (b, block) in cfg.blocks.iter().enumerate() {
        let mut env = match ins[b].take() {
            Some(env) => env,
            None => continue, // unreachable; cleanup removes it
        };
        for instr in &mut instrs[block.start..block.end] {
            changed |= instr.replace_uses(|v| match fact_of(&env, v) {
                Some(Fact::Const(c)) if !v.is_const() => Val::Const(c),
                _ => v.clone(),
            });
            transfer(&mut env, instr);
        }
    }
    changed
}

// ==================== copy propagation (block-local) ====================

fn copy_propagation(instrs: &mut Vec<Instr>) -> bool {
    let cfg = build_cfg(instrs);
    let mut changed = false;

    for block in &cfg.blocks {
        let mut env: FxHashMap<String, Val> = FxHashMap::default();
        for instr in &mut instrs[block.start..block.end] {
            changed |= instr.replace_uses(|v| match v.name().and_then(|n| env.get(&n)) {
                Some(src) => src.clone(),
                None => v.clone(),
            });

            if let Some(def) = instr.def() {
                env.remove(&def);
                env.retain(|_, src| src.name().as_deref() != Some(def.as_str()));
            }

            match instr {
                Instr::Assign { dest, src } if !src.is_const() => {
                    if let (Some(d), Some(_)) = (dest.name(), src.name()) {
                        if src.name() != dest.name() {
                            env.insert(d, src.clone());
                        }
                    }
                }
                Instr::Call { .. } => env.clear(),
                _ => {}
            }
        }
    }
    changed
}

// ==================== common subexpressions (block-local) ====================

#[derive(Clone, PartialEq, Eq, Hash)]
enum CseKey {
    Bin(Op, Val, Val),
    Neg(Val),
    Not(Val),
}

impl CseKey {
    fn mentions(&self, name: &str) -> bool {
        let hit = |v: &Val| v.name().as_deref() == Some(name);
        match self {
            CseKey::Bin(_, l, r) => hit(l) || hit(r),
            CseKey::Neg(v) | CseKey::Not(v) => hit(v),
        }
    }
}

fn commutative(op: Op) -> bool {
    matches!(op, Op::Add | Op::Mul | Op::Eq | Op::Ne | Op::And | Op::Or)
}

fn local_cse(instrs: &mut Vec<Instr>) -> bool {
    let cfg = build_cfg(instrs);
    let mut changed = false;

    for block in &cfg.blocks {
        let mut table: FxHashMap<CseKey, Val> = FxHashMap::default();
        for instr in &mut instrs[block.start..block.end] {
            let key = match instr {
                Instr::Binary {
                    op, left, right, ..
                } => {
                    let (mut l, mut r) = (left.clone(), right.clone());
                    if commutative(*op) && format!("{}", r) < format!("{}", l) {
                        std::mem::swap(&mut l, &mut r);
                    }
                    Some(CseKey::Bin(*op, l, r))
                }
                Instr::Neg { src, .. } => Some(CseKey::Neg(src.clone())),
                Instr::Not { src, .. } => Some(CseKey::Not(src.clone())),
                _ => None,
            };

            if let Some(key) = key {
                let dest = match instr {
                    Instr::Binary { dest, .. }
                    | Instr::Neg { dest, .. }
                    | Instr::Not { dest, .. } => dest.clone(),
                    _ => unreachable!(),
                };
                if let Some(prev) = table.get(&key) {
                    *instr = Instr::Assign {
                        dest,
                        src: prev.clone(),
                    };
                    changed = true;
                } else {
                    table.insert(key, dest);
                }
            }

            if let Some(def) = instr.def() {
                table.retain(|key, cached| {
                    !key.mentions(&def) && cached.name().as_deref() != Some(def.as_str())
                });
            }
            if matches!(instr, Instr::Call { .. }) {
                table.clear();
            }
        }
    }
    changed
}

// ==================== dead code elimination ====================

fn block_use_def(instrs: &[Instr]) -> (FxHashSet<String>, FxHashSet<String>) {
    let mut used = FxHashSet::default();
    let mut defined = FxHashSet::default();
    for instr in instrs {
        for u in instr.uses() {
            if !defined.contains(&u) {
                used.insert(u);
            }
        }
        if let Some(d) = instr.def() {
            defined.insert(d);
        }
    }
    (used, defined)
}

fn dead_code_elim(instrs: &mut Vec<Instr>) -> bool {
    let cfg = build_cfg(instrs);
    let nblocks = cfg.blocks.len();

    let mut gens = Vec::with_capacity(nblocks);
    let mut kills = Vec::with_capacity(nblocks);
    for block in &cfg.blocks {
        let (used, defined) = block_use_def(&instrs[block.start..block.end]);
        gens.push(used);
        kills.push(defined);
    }

    let mut live_in: Vec<FxHashSet<String>> = vec![FxHashSet::default(); nblocks];
    let mut live_out: Vec<FxHashSet<String>> = vec![FxHashSet::default(); nblocks];
    let mut stable = false;
    while !stable {
        stable = true;
        for b in (0..nblocks).rev() {
            let mut out = FxHashSet::default();
            for &s in &cfg.blocks[b].succs {
                out.extend(live_in[s].iter().cloned());
            }
            let mut inn = gens[b].clone();
            for name in &out {
                if !kills[b].contains(name) {
                    inn.insert(name.clone());
                }
            }
            if out != live_out[b] || inn != live_in[b] {
                stable = false;
                live_out[b] = out;
                live_in[b] = inn;
            }
        }
    }

    let mut remove: FxHashSet<usize> = FxHashSet::default();
    let mut changed = false;
    for (b, block) in cfg.blocks.iter().enumerate() {
        let mut live = live_out[b].clone();
        for i in (block.start..block.end).rev() {
            let instr = &mut instrs[i];
            // A call whose result nobody reads keeps its side effects
            // and drops the destination.
            if let Instr::Call { dest, .. } = instr {
                if let Some(name) = dest.as_ref().and_then(|d| d.name()) {
                    if !live.contains(&name) {
                        *dest = None;
                        changed = true;
                    }
                }
            }

            let def = instr.def();
            if is_pure(instr) {
                match &def {
                    Some(d) if !live.contains(d) => {
                        remove.insert(i);
                        changed = true;
                        continue;
                    }
                    _ => {}
                }
            }
            if let Some(d) = def {
                live.remove(&d);
            }
            for u in instr.uses() {
                live.insert(u);
            }
        }
    }

    if !remove.is_empty() {
        let mut idx = 0;
        instrs.retain(|_| {
            let keep = !remove.contains(&idx);
            idx += 1;
            keep
        });
    }
    changed
}

// ==================== loop-invariant code motion ====================

fn dominators(cfg: &Cfg) -> Vec<FxHashSet<usize>> {
    let n = cfg.blocks.len();
    let all: FxHashSet<usize> = (0..n).collect();
    let mut dom: Vec<FxHashSet<usize>> = vec![all; n];
    dom[0] = std::iter::once(0).collect();

    let mut stable = false;
    while !stable {
        stable = true;
        for b in 1..n {
            let mut new: Option<FxHashSet<usize>> = None;
            for &p in &cfg.blocks[b].preds {
                new = Some(match new {
                    None => dom[p].clone(),
                    Some(acc) => acc.intersection(&dom[p]).copied().collect(),
                });
            }
            let mut new = new.unwrap_or_default();
            new.insert(b);
            if new != dom[b] {
                dom[b] = new;
                stable = false;
            }
        }
    }
    dom
}

/// Blocks reaching the back-edge source without passing through the
/// header, plus the header itself.
fn natural_loop(cfg: &Cfg, tail: usize, header: usize) -> FxHashSet<usize> {
    let mut blocks: FxHashSet<usize> = std::iter::once(header).collect();
    let mut stack = vec![tail];
    while let Some(b) = stack.pop() {
        if blocks.insert(b) {
            for &p in &cfg.blocks[b].preds {
                stack.push(p);
            }
        }
    }
    blocks
}

fn licm(instrs: &mut Vec<Instr>, labels: &mut LabelAlloc) -> bool {
    let cfg = build_cfg(instrs);
    if cfg.blocks.len() < 2 {
        return false;
    }
    let dom = dominators(&cfg);

    for tail in 0..cfg.blocks.len() {
        for &header in &cfg.blocks[tail].succs {
            if !dom[tail].contains(&header) {
                continue;
            }
            let loop_blocks = natural_loop(&cfg, tail, header);
            if hoist_invariants(instrs, &cfg, &loop_blocks, header, labels) {
                return true;
            }
        }
    }
    false
}

fn hoist_invariants(
    instrs: &mut Vec<Instr>,
    cfg: &Cfg,
    loop_blocks: &FxHashSet<usize>,
    header: usize,
    labels: &mut LabelAlloc,
) -> bool {
    let header_start = cfg.blocks[header].start;
    let header_label = match &instrs[header_start] {
        Instr::Label(name) => name.clone(),
        _ => return false,
    };

    let in_loop = |idx: usize| loop_blocks.contains(&cfg.block_of_instr(idx));

    // How often each name is defined inside the loop, and which names
    // the rest of the function still reads.
    let mut defs_in_loop: FxHashMap<String, usize> = FxHashMap::default();
    for (i, instr) in instrs.iter().enumerate() {
        if in_loop(i) {
            if let Some(d) = instr.def() {
                *defs_in_loop.entry(d).or_insert(0) += 1;
            }
        }
    }
    let mut used_outside: FxHashSet<String> = FxHashSet::default();
    for (i, instr) in instrs.iter().enumerate() {
        if !in_loop(i) {
            used_outside.extend(instr.uses());
        }
    }

    let mut hoisted_idx: Vec<usize> = Vec::new();
    for (i, instr) in instrs.iter().enumerate() {
        if !in_loop(i) || !is_pure(instr) {
            continue;
        }
        // Never speculate a potential trap out of a guarded loop body.
        if let Instr::Binary { op, .. } = instr {
            if matches!(op, Op::Div | Op::Mod) {
                continue;
            }
        }
        let dest = match instr.def() {
            Some(d) => d,
            None => continue,
        };
        // Only expression temporaries: their uses follow the single
        // definition, so the zero-trip path cannot observe the move.
        let dest_is_temp = match instr {
            Instr::Binary { dest, .. }
            | Instr::Neg { dest, .. }
            | Instr::Not { dest, .. }
            | Instr::Assign { dest, .. } => matches!(dest, Val::Temp(_)),
            _ => false,
        };
        if !dest_is_temp
            || defs_in_loop.get(&dest) != Some(&1)
            || used_outside.contains(&dest)
        {
            continue;
        }
        let invariant = instr
            .uses()
            .iter()
            .all(|name| !defs_in_loop.contains_key(name));
        if invariant {
            hoisted_idx.push(i);
        }
    }

    if hoisted_idx.is_empty() {
        return false;
    }

    let moved: Vec<Instr> = hoisted_idx.iter().map(|&i| instrs[i].clone()).collect();

    // Entering jumps move to a preheader synthesized just before the
    // header; the back edge keeps its target.
    let pre_label = labels.fresh();
    for (i, instr) in instrs.iter_mut().enumerate() {
        if loop_blocks.contains(&cfg.block_of_instr(i)) {
            continue;
        }
        match instr {
            Instr::Goto { label } | Instr::IfGoto { label, .. } if *label == header_label => {
                *label = pre_label.clone();
            }
            _ => {}
        }
    }

    let hoisted: FxHashSet<usize> = hoisted_idx.into_iter().collect();
    let mut out: Vec<Instr> = Vec::with_capacity(instrs.len() + 1 + moved.len());
    for (i, instr) in instrs.drain(..).enumerate() {
        if i == header_start {
            out.push(Instr::Label(pre_label.clone()));
            out.extend(moved.iter().cloned());
        }
        if hoisted.contains(&i) {
            continue;
        }
        out.push(instr);
    }
    *instrs = out;
    true
}

// ==================== control-flow cleanup ====================

fn cleanup(instrs: &mut Vec<Instr>) -> bool {
    let mut changed = false;
    changed |= remove_unreachable(instrs);
    changed |= thread_jumps(instrs);
    changed |= drop_redundant_gotos(instrs);
    changed |= drop_unreferenced_labels(instrs);
    changed
}

/// Drop every block the entry cannot reach. Function delimiters stay.
fn remove_unreachable(instrs: &mut Vec<Instr>) -> bool {
    let cfg = build_cfg(instrs);
    let mut reachable: FxHashSet<usize> = FxHashSet::default();
    let mut stack = vec![0usize];
    while let Some(b) = stack.pop() {
        if reachable.insert(b) {
            for &s in &cfg.blocks[b].succs {
                stack.push(s);
            }
        }
    }
    if reachable.len() == cfg.blocks.len() {
        return false;
    }

    let mut keep = vec![false; instrs.len()];
    for (bi, block) in cfg.blocks.iter().enumerate() {
        if reachable.contains(&bi) {
            for flag in &mut keep[block.start..block.end] {
                *flag = true;
            }
        }
    }
    let mut changed = false;
    let mut idx = 0;
    instrs.retain(|instr| {
        let keep_it =
            keep[idx] || matches!(instr, Instr::FuncBegin { .. } | Instr::FuncEnd { .. });
        if !keep_it {
            changed = true;
        }
        idx += 1;
        keep_it
    });
    changed
}

/// A jump to a label that immediately jumps again is retargeted to the
/// final destination.
fn thread_jumps(instrs: &mut Vec<Instr>) -> bool {
    let mut redirect: FxHashMap<String, String> = FxHashMap::default();
    for (i, instr) in instrs.iter().enumerate() {
        if let Instr::Label(name) = instr {
            if let Some(Instr::Goto { label }) = instrs.get(i + 1) {
                if label != name {
                    redirect.insert(name.clone(), label.clone());
                }
            }
        }
    }
    if redirect.is_empty() {
        return false;
    }

    fn final_target(mut label: String, redirect: &FxHashMap<String, String>) -> String {
        let mut guard = 0;
        while let Some(next) = redirect.get(&label) {
            label = next.clone();
            guard += 1;
            if guard > 1024 {
                break;
            }
        }
        label
    }

    let mut changed = false;
    for instr in instrs.iter_mut() {
        match instr {
            Instr::Goto { label } | Instr::IfGoto { label, .. } => {
                let target = final_target(label.clone(), &redirect);
                if *label != target {
                    *label = target;
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

/// A Goto whose target label is the next instruction is a no-op.
fn drop_redundant_gotos(instrs: &mut Vec<Instr>) -> bool {
    let mut remove: FxHashSet<usize> = FxHashSet::default();
    for (i, instr) in instrs.iter().enumerate() {
        if let Instr::Goto { label } = instr {
            if let Some(Instr::Label(next)) = instrs.get(i + 1) {
                if next == label {
                    remove.insert(i);
                }
            }
        }
    }
    if remove.is_empty() {
        return false;
    }
    let mut idx = 0;
    instrs.retain(|_| {
        let keep = !remove.contains(&idx);
        idx += 1;
        keep
    });
    true
}

fn drop_unreferenced_labels(instrs: &mut Vec<Instr>) -> bool {
    let mut refs: FxHashSet<&str> = FxHashSet::default();
    for instr in instrs.iter() {
        match instr {
            Instr::Goto { label } | Instr::IfGoto { label, .. } => {
                refs.insert(label.as_str());
            }
            _ => {}
        }
    }
    let refs: FxHashSet<String> = refs.into_iter().map(str::to_string).collect();
    let before = instrs.len();
    instrs.retain(|instr| match instr {
        Instr::Label(name) => refs.contains(name),
        _ => true,
    });
    before != instrs.len()
}

// ==================== small-function inlining ====================

struct InlineInfo {
    params: Vec<String>,
    body: Vec<Instr>,
}

/// A callee qualifies when it is small, calls nothing and loops
/// nowhere; its cloned body replaces the PARAM/CALL pair at a site.
fn inline_small_functions(
    funcs: &mut Vec<Vec<Instr>>,
    labels: &mut LabelAlloc,
    inline_counter: &mut usize,
) -> bool {
    let mut inlineable: FxHashMap<String, InlineInfo> = FxHashMap::default();
    for func in funcs.iter() {
        let (name, params) = match func.first() {
            Some(Instr::FuncBegin { name, params, .. }) => (name.clone(), params.clone()),
            _ => continue,
        };
        let body = &func[1..func.len() - 1];
        if body.len() > INLINE_THRESHOLD {
            continue;
        }
        if body.iter().any(|i| matches!(i, Instr::Call { .. })) {
            continue;
        }
        if has_backward_jump(body) {
            continue;
        }
        inlineable.insert(
            name,
            InlineInfo {
                params,
                body: body.to_vec(),
            },
        );
    }
    if inlineable.is_empty() {
        return false;
    }

    let mut changed = false;
    for func in funcs.iter_mut() {
        let own_name = match func.first() {
            Some(Instr::FuncBegin { name, .. }) => name.clone(),
            _ => continue,
        };
        loop {
            let site = find_inline_site(func, &own_name, &inlineable);
            let (call_idx, callee) = match site {
                Some(s) => s,
                None => break,
            };
            let info = &inlineable[&callee];
            splice_call(func, call_idx, info, labels, inline_counter);
            changed = true;
        }
    }
    changed
}

fn has_backward_jump(body: &[Instr]) -> bool {
    let mut label_pos: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, instr) in body.iter().enumerate() {
        if let Instr::Label(name) = instr {
            label_pos.insert(name.as_str(), i);
        }
    }
    for (i, instr) in body.iter().enumerate() {
        let target = match instr {
            Instr::Goto { label } | Instr::IfGoto { label, .. } => label.as_str(),
            _ => continue,
        };
        if label_pos.get(target).map_or(false, |&pos| pos <= i) {
            return true;
        }
    }
    false
}

/// A usable site has its argc PARAMs directly in front of the CALL.
fn find_inline_site(
    func: &[Instr],
    own_name: &str,
    inlineable: &FxHashMap<String, InlineInfo>,
) -> Option<(usize, String)> {
    for (i, instr) in func.iter().enumerate() {
        if let Instr::Call { func: callee, argc, .. } = instr {
            if callee == own_name || !inlineable.contains_key(callee) {
                continue;
            }
            if i < *argc {
                continue;
            }
            let params_ok = func[i - *argc..i]
                .iter()
                .all(|p| matches!(p, Instr::Param { .. }));
            if params_ok {
                return Some((i, callee.clone()));
            }
        }
    }
    None
}

fn splice_call(
    func: &mut Vec<Instr>,
    call_idx: usize,
    info: &InlineInfo,
    labels: &mut LabelAlloc,
    inline_counter: &mut usize,
) {
    let (dest, argc) = match &func[call_idx] {
        Instr::Call { dest, argc, .. } => (dest.clone(), *argc),
        _ => unreachable!(),
    };
    let args: Vec<Val> = func[call_idx - argc..call_idx]
        .iter()
        .map(|p| match p {
            Instr::Param { value } => value.clone(),
            _ => unreachable!(),
        })
        .collect();

    *inline_counter += 1;
    let suffix = *inline_counter;

    // Parameters that are only read substitute directly; a written
    // parameter becomes a local copy so the argument stays intact.
    let mut written_params: FxHashSet<String> = FxHashSet::default();
    for instr in &info.body {
        if let Some(d) = instr.def() {
            if info.params.iter().any(|p| *p == d) {
                written_params.insert(d);
            }
        }
    }

    let mut subst: FxHashMap<String, Val> = FxHashMap::default();
    let mut prologue: Vec<Instr> = Vec::new();
    for (param, arg) in info.params.iter().zip(args.iter()) {
        if written_params.contains(param) {
            let local = format!("{}_inl{}", param, suffix);
            prologue.push(Instr::Assign {
                dest: Val::Var(local.clone()),
                src: arg.clone(),
            });
            subst.insert(param.clone(), Val::Var(local));
        } else {
            subst.insert(param.clone(), arg.clone());
        }
    }

    let temp_base = 1 + func
        .iter()
        .flat_map(max_temp_in)
        .max()
        .unwrap_or(0);

    let mut label_map: FxHashMap<String, String> = FxHashMap::default();
    for instr in &info.body {
        if let Instr::Label(name) = instr {
            label_map.insert(name.clone(), labels.fresh());
        }
    }
    let end_label = labels.fresh();

    let map_val = |v: &Val| -> Val {
        match v {
            Val::Const(_) => v.clone(),
            Val::Temp(k) => Val::Temp(temp_base + k),
            Val::Var(name) => match subst.get(name) {
                Some(arg) => arg.clone(),
                None => Val::Var(format!("{}_inl{}", name, suffix)),
            },
        }
    };

    let mut spliced: Vec<Instr> = prologue;
    for instr in &info.body {
        match instr {
            Instr::Return(value) => {
                if let (Some(d), Some(v)) = (&dest, value) {
                    spliced.push(Instr::Assign {
                        dest: d.clone(),
                        src: map_val(v),
                    });
                }
                spliced.push(Instr::Goto {
                    label: end_label.clone(),
                });
            }
            Instr::Label(name) => spliced.push(Instr::Label(label_map[name].clone())),
            Instr::Goto { label } => spliced.push(Instr::Goto {
                label: label_map[label].clone(),
            }),
            Instr::IfGoto { cond, label } => spliced.push(Instr::IfGoto {
                cond: map_val(cond),
                label: label_map[label].clone(),
            }),
            Instr::Binary {
                op,
                dest,
                left,
                right,
            } => spliced.push(Instr::Binary {
                op: *op,
                dest: map_val(dest),
                left: map_val(left),
                right: map_val(right),
            }),
            Instr::Neg { dest, src } => spliced.push(Instr::Neg {
                dest: map_val(dest),
                src: map_val(src),
            }),
            Instr::Not { dest, src } => spliced.push(Instr::Not {
                dest: map_val(dest),
                src: map_val(src),
            }),
            Instr::Assign { dest, src } => spliced.push(Instr::Assign {
                dest: map_val(dest),
                src: map_val(src),
            }),
            Instr::Param { .. }
            | Instr::Call { .. }
            | Instr::FuncBegin { .. }
            | Instr::FuncEnd { .. } => unreachable!("rejected by the inlineable filter"),
        }
    }
    spliced.push(Instr::Label(end_label));

    func.splice(call_idx - argc..=call_idx, spliced);
}

fn max_temp_in(instr: &Instr) -> Option<usize> {
    let mut max: Option<usize> = None;
    let mut see = |v: &Val| {
        if let Val::Temp(k) = v {
            max = Some(max.map_or(*k, |m: usize| m.max(*k)));
        }
    };
    match instr {
        Instr::Binary {
            dest, left, right, ..
        } => {
            see(dest);
            see(left);
            see(right);
        }
        Instr::Neg { dest, src } | Instr::Not { dest, src } | Instr::Assign { dest, src } => {
            see(dest);
            see(src);
        }
        Instr::IfGoto { cond, .. } => see(cond),
        Instr::Param { value } => see(value),
        Instr::Return(Some(v)) => see(v),
        Instr::Call { dest: Some(d), .. } => see(d),
        _ => {}
    }
    max
}

// ==================== unused functions ====================

/// Functions not transitively reachable from `main` are deleted once
/// inlining has had its chance to absorb them.
fn remove_unused_functions(funcs: &mut Vec<Vec<Instr>>) {
    let mut callees: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
    for func in funcs.iter() {
        let name = match func.first() {
            Some(Instr::FuncBegin { name, .. }) => name.clone(),
            _ => continue,
        };
        let called: FxHashSet<String> = func
            .iter()
            .filter_map(|i| match i {
                Instr::Call { func, .. } => Some(func.clone()),
                _ => None,
            })
            .collect();
        callees.insert(name, called);
    }

    let mut reachable: FxHashSet<String> = FxHashSet::default();
    let mut stack = vec!["main".to_string()];
    while let Some(name) = stack.pop() {
        if reachable.insert(name.clone()) {
            if let Some(called) = callees.get(&name) {
                stack.extend(called.iter().cloned());
            }
        }
    }

    funcs.retain(|func| match func.first() {
        Some(Instr::FuncBegin { name, .. }) => reachable.contains(name),
        _ => true,
    });
}

// ==================== tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RetKind;
    use crate::{ir, lexer, lower, parser, typecheck};

    fn build_ir(src: &str) -> IrProgram {
        let tokens = lexer::lex(src).expect("lex");
        let ast = parser::parse(&tokens).expect("parse");
        let diags = typecheck::typecheck(&ast);
        assert!(!diags.has_errors(), "semantic errors: {:?}", diags.errors);
        lower::lower(&ast)
    }

    fn optimized(src: &str, inline: bool) -> IrProgram {
        let mut program = build_ir(src);
        optimize(&mut program, inline);
        ir::validate(&program).expect("well-formed after optimization");
        program
    }

    fn function_body<'a>(program: &'a IrProgram, name: &str) -> &'a [Instr] {
        for (begin, end) in program.function_ranges() {
            if let Instr::FuncBegin { name: n, .. } = &program.instrs[begin] {
                if n == name {
                    return &program.instrs[begin..=end];
                }
            }
        }
        panic!("function {} not found", name);
    }

    #[test]
    fn folding_keeps_divide_by_zero() {
        let mut instrs = vec![
            Instr::FuncBegin {
                name: "main".to_string(),
                ret: RetKind::Int,
                params: vec![],
            },
            Instr::Binary {
                op: Op::Div,
                dest: Val::Temp(0),
                left: Val::Const(1),
                right: Val::Const(0),
            },
            Instr::Return(Some(Val::Temp(0))),
            Instr::FuncEnd {
                name: "main".to_string(),
            },
        ];
        assert!(!const_fold(&mut instrs));
        assert!(matches!(instrs[1], Instr::Binary { op: Op::Div, .. }));
    }

    #[test]
    fn folding_evaluates_logical_opcodes() {
        let mut instrs = vec![
            Instr::Binary {
                op: Op::And,
                dest: Val::Temp(0),
                left: Val::Const(3),
                right: Val::Const(2),
            },
            Instr::Binary {
                op: Op::Or,
                dest: Val::Temp(1),
                left: Val::Const(0),
                right: Val::Const(0),
            },
        ];
        assert!(const_fold(&mut instrs));
        assert!(
            matches!(&instrs[0], Instr::Assign { src: Val::Const(1), .. }),
            "3 AND 2 normalizes to 1"
        );
        assert!(matches!(
            &instrs[1],
            Instr::Assign {
                src: Val::Const(0),
                ..
            }
        ));
    }

    #[test]
    fn constants_propagate_through_joins() {
        let program = optimized(
            "int f(int c) { int x = 2; int y = 0; if (c) { y = x; } else { y = x; } return y; }\n\
             int main() { return f(1); }",
            false,
        );
        let body = function_body(&program, "f");
        assert!(
            body.iter()
                .any(|i| matches!(i, Instr::Return(Some(Val::Const(2))))),
            "both join arms assign the same constant:\n{}",
            program
        );
    }

    #[test]
    fn dead_stores_are_removed() {
        let program = optimized("int main() { int x = 1; int y = 2; return x; }", false);
        let body = function_body(&program, "main");
        assert!(
            !body
                .iter()
                .any(|i| i.def().as_deref() == Some("y_scope2")),
            "dead store to y must be gone:\n{}",
            program
        );
    }

    #[test]
    fn invariant_temps_move_to_a_preheader() {
        let program = optimized(
            "int f(int a, int b) {\n\
               int s = 0;\n\
               int i = 0;\n\
               while (i < 100) { s = s + (a + b); i = i + 1; }\n\
               return s;\n\
             }\n\
             int main() { return f(3, 4); }",
            false,
        );
        let body = function_body(&program, "f");
        let add_idx = body
            .iter()
            .position(|i| {
                matches!(i, Instr::Binary { op: Op::Add, left: Val::Var(l), right: Val::Var(r), .. }
                    if l == "a_scope1" && r == "b_scope1")
            })
            .expect("a + b survives");
        let backward_target = body
            .iter()
            .enumerate()
            .find_map(|(i, instr)| match instr {
                Instr::Goto { label } | Instr::IfGoto { label, .. } => body[..i]
                    .iter()
                    .position(|l| matches!(l, Instr::Label(n) if n == label)),
                _ => None,
            })
            .expect("loop header label");
        assert!(
            add_idx < backward_target,
            "a + b must sit before the loop header:\n{}",
            program
        );
    }

    #[test]
    fn small_functions_inline_and_disappear() {
        let program = optimized(
            "int add(int a, int b) { return a + b; }\n\
             int main() { return add(7, 35); }",
            true,
        );
        assert_eq!(
            program.function_ranges().len(),
            1,
            "add is absorbed and then unreachable:\n{}",
            program
        );
        let body = function_body(&program, "main");
        assert!(
            body.iter()
                .any(|i| matches!(i, Instr::Return(Some(Val::Const(42))))),
            "the inlined sum folds to 42:\n{}",
            program
        );
        assert!(!body.iter().any(|i| matches!(i, Instr::Call { .. })));
    }

    #[test]
    fn optimizer_is_sound_on_loop_control_flow() {
        let program = optimized(
            "int main() {\n\
               int s = 0;\n\
               int i = 0;\n\
               while (i < 10) {\n\
                 i = i + 1;\n\
                 if (i == 5) { continue; }\n\
                 if (i == 8) { break; }\n\
                 s = s + i;\n\
               }\n\
               return s;\n\
             }",
            false,
        );
        // The loop survives: a backward jump must still exist.
        let body = function_body(&program, "main");
        assert!(body
            .iter()
            .enumerate()
            .any(|(i, instr)| match instr {
                Instr::Goto { label } | Instr::IfGoto { label, .. } => body[..i]
                    .iter()
                    .any(|l| matches!(l, Instr::Label(n) if n == label)),
                _ => false,
            }));
    }
}
