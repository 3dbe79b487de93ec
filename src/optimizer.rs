//! Machine-independent IR optimization
//!
//! Runs up to `level` passes over every function and stops as soon as a
//! full pass changes nothing. Each pass applies, in order: constant
//! folding, constant propagation, copy propagation, dead-code elimination,
//! and NOP removal. At level 2 and above a peephole pass runs once per
//! function after the fixed-point loop.
//!
//! Propagation is a single linear scan per function: a recorded binding is
//! evicted as soon as its name is redefined. No pass ever increases the
//! instruction count, so optimization at a given level is idempotent.

use crate::config::OptimizationLevel;
use crate::ir::{Const, Instruction, IrFunction, IrProgram, Opcode, Value};
use std::collections::{HashMap, HashSet};

/// Optimize a program at the given level. Level `O0` returns the program
/// untouched.
pub fn optimize_ir(mut program: IrProgram, level: OptimizationLevel) -> IrProgram {
    let passes = level.passes();
    if passes == 0 {
        return program;
    }

    let mut optimizer = Optimizer::new();
    optimizer.run_passes(&mut program, passes);

    if level >= OptimizationLevel::O2 {
        let mut changed = false;
        for function in &mut program.functions {
            changed |= peephole(function);
        }
        // Peephole rewrites can expose further propagation and dead code;
        // clean up so optimizing an already-optimized program is a no-op
        if changed {
            optimizer.run_passes(&mut program, passes);
        }
    }

    program
}

struct Optimizer {
    changed: bool,
}

impl Optimizer {
    fn new() -> Self {
        Optimizer { changed: false }
    }

    /// Run the pass pipeline over every function, up to `passes` times,
    /// stopping early at a fixed point.
    fn run_passes(&mut self, program: &mut IrProgram, passes: usize) {
        for _ in 0..passes {
            self.changed = false;
            for function in &mut program.functions {
                self.optimize_function(function);
            }
            if !self.changed {
                break;
            }
        }
    }

    fn optimize_function(&mut self, function: &mut IrFunction) {
        self.constant_folding(function);
        self.constant_propagation(function);
        self.copy_propagation(function);
        self.dead_code_elimination(function);
        self.remove_nops(function);
    }

    /// Replace binary operations on two constants with an assignment of
    /// the evaluated result. Division and modulo by zero are left alone.
    fn constant_folding(&mut self, function: &mut IrFunction) {
        for instr in &mut function.instructions {
            if !instr.opcode.is_binary() {
                continue;
            }
            let (Some(lhs), Some(rhs)) = (
                instr.arg1.as_ref().and_then(Value::as_const),
                instr.arg2.as_ref().and_then(Value::as_const),
            ) else {
                continue;
            };

            if let Some(result) = eval_binary(instr.opcode, lhs, rhs) {
                let target = instr.result.clone();
                *instr = Instruction {
                    opcode: Opcode::Assign,
                    result: target,
                    arg1: Some(Value::Constant(result)),
                    arg2: None,
                    arg3: None,
                    label: None,
                };
                self.changed = true;
            }
        }
    }

    /// Linear-scan constant propagation: record `x -> c` on `ASSIGN x c`,
    /// rewrite later operand reads, and evict on any redefinition.
    fn constant_propagation(&mut self, function: &mut IrFunction) {
        let mut constants: HashMap<String, Const> = HashMap::new();

        for instr in &mut function.instructions {
            for arg in [&mut instr.arg1, &mut instr.arg2].into_iter().flatten() {
                if let Some(name) = arg.name()
                    && let Some(&value) = constants.get(name)
                {
                    *arg = Value::Constant(value);
                    self.changed = true;
                }
            }

            if let Some(name) = instr.result.as_ref().and_then(Value::name) {
                let constant = (instr.opcode == Opcode::Assign)
                    .then(|| instr.arg1.as_ref().and_then(Value::as_const))
                    .flatten();
                match constant {
                    Some(value) => {
                        constants.insert(name.to_string(), value);
                    }
                    // Any other definition invalidates the binding
                    None => {
                        constants.remove(name);
                    }
                }
            }
        }
    }

    /// Like constant propagation, but for `ASSIGN x y` where `y` is a temp
    /// or variable: later reads of `x` become reads of `y` until `x` is
    /// redefined.
    fn copy_propagation(&mut self, function: &mut IrFunction) {
        let mut copies: HashMap<String, Value> = HashMap::new();

        for instr in &mut function.instructions {
            for arg in [&mut instr.arg1, &mut instr.arg2].into_iter().flatten() {
                if let Some(name) = arg.name()
                    && let Some(source) = copies.get(name)
                {
                    *arg = source.clone();
                    self.changed = true;
                }
            }

            if let Some(name) = instr.result.as_ref().and_then(Value::name) {
                let copied = (instr.opcode == Opcode::Assign)
                    .then(|| instr.arg1.clone())
                    .flatten()
                    .filter(|v| v.name().is_some());
                match copied {
                    Some(source) => {
                        copies.insert(name.to_string(), source);
                    }
                    None => {
                        copies.remove(name);
                    }
                }
            }
        }
    }

    /// Drop instructions whose result is never read, unless the opcode has
    /// side effects or is control-significant.
    fn dead_code_elimination(&mut self, function: &mut IrFunction) {
        let mut used: HashSet<String> = HashSet::new();
        for instr in &function.instructions {
            for arg in [&instr.arg1, &instr.arg2, &instr.arg3].into_iter().flatten() {
                if let Some(name) = arg.name() {
                    used.insert(name.to_string());
                }
            }
        }

        let before = function.instructions.len();
        function.instructions.retain(|instr| {
            if instr.opcode.has_side_effects() {
                return true;
            }
            match instr.result.as_ref().and_then(Value::name) {
                Some(name) => used.contains(name),
                None => true,
            }
        });

        if function.instructions.len() != before {
            self.changed = true;
        }
    }

    fn remove_nops(&mut self, function: &mut IrFunction) {
        let before = function.instructions.len();
        function.instructions.retain(|i| i.opcode != Opcode::Nop);
        if function.instructions.len() != before {
            self.changed = true;
        }
    }
}

/// Evaluate a binary opcode over two constants. Returns `None` for
/// anything that must not fold: division or modulo by zero, overflow,
/// shifts out of range, or bitwise work on floats.
fn eval_binary(opcode: Opcode, lhs: Const, rhs: Const) -> Option<Const> {
    use Const::{Float, Int};

    match (lhs, rhs) {
        (Int(a), Int(b)) => eval_int(opcode, a, b),
        (Float(a), Float(b)) => eval_float(opcode, a, b),
        // Mixed operands promote the integer side
        (Int(a), Float(b)) => eval_float(opcode, a as f64, b),
        (Float(a), Int(b)) => eval_float(opcode, a, b as f64),
    }
}

fn eval_int(opcode: Opcode, a: i64, b: i64) -> Option<Const> {
    let bool_const = |v: bool| Some(Const::Int(i64::from(v)));

    match opcode {
        Opcode::Add => a.checked_add(b).map(Const::Int),
        Opcode::Sub => a.checked_sub(b).map(Const::Int),
        Opcode::Mul => a.checked_mul(b).map(Const::Int),
        // Truncating division, like the source language
        Opcode::Div => (b != 0).then(|| a.checked_div(b).map(Const::Int)).flatten(),
        Opcode::Mod => (b != 0).then(|| a.checked_rem(b).map(Const::Int)).flatten(),
        Opcode::And => Some(Const::Int(a & b)),
        Opcode::Or => Some(Const::Int(a | b)),
        Opcode::Xor => Some(Const::Int(a ^ b)),
        Opcode::Shl => u32::try_from(b)
            .ok()
            .and_then(|shift| a.checked_shl(shift))
            .map(Const::Int),
        Opcode::Shr => u32::try_from(b)
            .ok()
            .and_then(|shift| a.checked_shr(shift))
            .map(Const::Int),
        Opcode::Land => bool_const(a != 0 && b != 0),
        Opcode::Lor => bool_const(a != 0 || b != 0),
        Opcode::Eq => bool_const(a == b),
        Opcode::Ne => bool_const(a != b),
        Opcode::Lt => bool_const(a < b),
        Opcode::Le => bool_const(a <= b),
        Opcode::Gt => bool_const(a > b),
        Opcode::Ge => bool_const(a >= b),
        _ => None,
    }
}

fn eval_float(opcode: Opcode, a: f64, b: f64) -> Option<Const> {
    let bool_const = |v: bool| Some(Const::Int(i64::from(v)));

    match opcode {
        Opcode::Add => Some(Const::Float(a + b)),
        Opcode::Sub => Some(Const::Float(a - b)),
        Opcode::Mul => Some(Const::Float(a * b)),
        Opcode::Div => (b != 0.0).then(|| Const::Float(a / b)),
        Opcode::Mod => (b != 0.0).then(|| Const::Float(a % b)),
        Opcode::Land => bool_const(a != 0.0 && b != 0.0),
        Opcode::Lor => bool_const(a != 0.0 || b != 0.0),
        Opcode::Eq => bool_const(a == b),
        Opcode::Ne => bool_const(a != b),
        Opcode::Lt => bool_const(a < b),
        Opcode::Le => bool_const(a <= b),
        Opcode::Gt => bool_const(a > b),
        Opcode::Ge => bool_const(a >= b),
        // Bitwise work never folds on floats
        _ => None,
    }
}

/// Count how many instructions reference `name` as an operand or result.
fn reference_count(function: &IrFunction, name: &str) -> usize {
    function
        .instructions
        .iter()
        .map(|instr| {
            [&instr.result, &instr.arg1, &instr.arg2, &instr.arg3]
                .into_iter()
                .flatten()
                .filter(|v| v.name() == Some(name))
                .count()
        })
        .sum()
}

/// Local rewrites on adjacent instructions, applied once per function at
/// level 2 and above. Returns whether anything changed.
fn peephole(function: &mut IrFunction) -> bool {
    let collapsed = collapse_redundant_copies(function);
    let simplified = simplify_arithmetic(function);
    collapsed || simplified
}

/// Collapse `x = y; z = x` into `z = y`, dropping the intermediate copy
/// when `x` is a temp with no other uses.
fn collapse_redundant_copies(function: &mut IrFunction) -> bool {
    let mut changed = false;
    let mut dead_copies = Vec::new();

    for i in 0..function.instructions.len().saturating_sub(1) {
        let first = &function.instructions[i];
        let second = &function.instructions[i + 1];

        if first.opcode != Opcode::Assign || second.opcode != Opcode::Assign {
            continue;
        }
        let (Some(intermediate), Some(source)) = (first.result.clone(), first.arg1.clone()) else {
            continue;
        };
        if second.arg1 != Some(intermediate.clone()) || source == intermediate {
            continue;
        }

        function.instructions[i + 1].arg1 = Some(source);
        changed = true;

        if let Value::Temp(name) = &intermediate
            && reference_count(function, name) == 1
        {
            // After the rewrite only the copy itself still names the temp
            dead_copies.push(i);
        }
    }

    for index in dead_copies.into_iter().rev() {
        function.instructions.remove(index);
    }

    changed
}

/// Algebraic identities: `y + 0`, `0 + y`, `y * 1`, `1 * y` reduce to `y`;
/// `y * 0`, `0 * y` reduce to `0`. Returns whether anything changed.
fn simplify_arithmetic(function: &mut IrFunction) -> bool {
    let mut changed = false;
    for instr in &mut function.instructions {
        let replacement = match instr.opcode {
            Opcode::Add => {
                if instr.arg2.as_ref().and_then(Value::as_const) == Some(Const::Int(0)) {
                    instr.arg1.clone()
                } else if instr.arg1.as_ref().and_then(Value::as_const) == Some(Const::Int(0)) {
                    instr.arg2.clone()
                } else {
                    None
                }
            }
            Opcode::Mul => {
                let lhs = instr.arg1.as_ref().and_then(Value::as_const);
                let rhs = instr.arg2.as_ref().and_then(Value::as_const);
                if lhs == Some(Const::Int(0)) || rhs == Some(Const::Int(0)) {
                    Some(Value::int(0))
                } else if rhs == Some(Const::Int(1)) {
                    instr.arg1.clone()
                } else if lhs == Some(Const::Int(1)) {
                    instr.arg2.clone()
                } else {
                    None
                }
            }
            _ => None,
        };

        if let (Some(value), Some(result)) = (replacement, instr.result.clone()) {
            *instr = Instruction::assign(result, value);
            changed = true;
        }
    }
    changed
}
