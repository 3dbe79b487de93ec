//! Three-address intermediate representation
//!
//! A flat, machine-independent instruction set grouped into functions. Each
//! instruction names at most one result and up to three operands; control
//! flow is explicit through labels and jumps. The [`Builder`] hands out
//! temporaries (`t0, t1, ...`) and labels (`<prefix><n>`) from monotonic
//! per-function counters.
//!
//! The `Display` implementations define the canonical textual form:
//! instructions indented four spaces, labels at column zero, and the
//! operator spellings matching the source language.

use crate::ast::TypeNode;

/// IR instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,

    // Bitwise
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,

    // Logical
    Land,
    Lor,
    Lnot,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Memory
    Load,
    Store,
    LoadAddr,
    Alloc,
    Free,

    // Assignment
    Assign,

    // Control flow
    Label,
    Goto,
    IfFalse,
    IfTrue,

    // Function calls
    Param,
    Call,
    Return,

    // Array/pointer operations
    Index,
    StoreIndex,

    // Type conversion
    Cast,

    // Special
    Nop,
    /// Reserved for SSA construction; never emitted by the generator
    Phi,
}

impl Opcode {
    /// Binary opcodes eligible for constant folding.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
                | Opcode::Land
                | Opcode::Lor
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Lt
                | Opcode::Le
                | Opcode::Gt
                | Opcode::Ge
        )
    }

    /// Opcodes that must survive dead-code elimination regardless of
    /// whether their result is used.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Opcode::Return
                | Opcode::Call
                | Opcode::Store
                | Opcode::StoreIndex
                | Opcode::Goto
                | Opcode::IfFalse
                | Opcode::IfTrue
                | Opcode::Label
                | Opcode::Param
                | Opcode::Free
        )
    }

    /// Source-language spelling for binary opcodes.
    fn binary_symbol(self) -> &'static str {
        match self {
            Opcode::Add => "+",
            Opcode::Sub => "-",
            Opcode::Mul => "*",
            Opcode::Div => "/",
            Opcode::Mod => "%",
            Opcode::And => "&",
            Opcode::Or => "|",
            Opcode::Xor => "^",
            Opcode::Shl => "<<",
            Opcode::Shr => ">>",
            Opcode::Land => "&&",
            Opcode::Lor => "||",
            Opcode::Eq => "==",
            Opcode::Ne => "!=",
            Opcode::Lt => "<",
            Opcode::Le => "<=",
            Opcode::Gt => ">",
            Opcode::Ge => ">=",
            _ => "?",
        }
    }
}

/// A constant operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
}

impl Const {
    /// Truthiness for logical folding: zero is false, all else true.
    pub fn is_truthy(self) -> bool {
        match self {
            Const::Int(v) => v != 0,
            Const::Float(v) => v != 0.0,
        }
    }
}

impl std::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(v) => write!(f, "{}", v),
        }
    }
}

/// An operand or result of an IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Compiler temporary: `t0`, `t1`, ...
    Temp(String),
    Constant(Const),
    /// Named source-level variable
    Variable(String),
    /// Reference to a label, e.g. an interned string literal
    Label(String),
}

impl Value {
    pub fn int(v: i64) -> Value {
        Value::Constant(Const::Int(v))
    }

    /// The name of a temp or variable, if this value has one. Propagation
    /// and dead-code elimination key their maps on these names.
    pub fn name(&self) -> Option<&str> {
        match self {
            Value::Temp(name) | Value::Variable(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<Const> {
        match self {
            Value::Constant(c) => Some(*c),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Temp(name) | Value::Variable(name) | Value::Label(name) => {
                write!(f, "{}", name)
            }
            Value::Constant(c) => write!(f, "{}", c),
        }
    }
}

/// A three-address instruction: `result = arg1 op arg2`, with `label` used
/// by control-flow opcodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub result: Option<Value>,
    pub arg1: Option<Value>,
    pub arg2: Option<Value>,
    pub arg3: Option<Value>,
    pub label: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            result: None,
            arg1: None,
            arg2: None,
            arg3: None,
            label: None,
        }
    }

    pub fn assign(result: Value, value: Value) -> Self {
        Instruction {
            opcode: Opcode::Assign,
            result: Some(result),
            arg1: Some(value),
            arg2: None,
            arg3: None,
            label: None,
        }
    }
}

fn opt(value: &Option<Value>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.label.as_deref().unwrap_or("");
        match self.opcode {
            Opcode::Label => write!(f, "{}", label),
            Opcode::Goto => write!(f, "    goto {}", label),
            Opcode::IfFalse => write!(f, "    if !{} goto {}", opt(&self.arg1), label),
            Opcode::IfTrue => write!(f, "    if {} goto {}", opt(&self.arg1), label),
            Opcode::Param => write!(f, "    param {}", opt(&self.arg1)),
            Opcode::Call => match &self.result {
                Some(result) => write!(
                    f,
                    "    {} = call {}({})",
                    result,
                    opt(&self.arg1),
                    opt(&self.arg2)
                ),
                None => write!(f, "    call {}({})", opt(&self.arg1), opt(&self.arg2)),
            },
            Opcode::Return => match &self.arg1 {
                Some(value) => write!(f, "    return {}", value),
                None => write!(f, "    return"),
            },
            Opcode::Alloc => write!(f, "    {} = alloc {}", opt(&self.result), opt(&self.arg1)),
            Opcode::Free => write!(f, "    free {}", opt(&self.arg1)),
            Opcode::Load => write!(f, "    {} = *{}", opt(&self.result), opt(&self.arg1)),
            Opcode::Store => write!(f, "    *{} = {}", opt(&self.result), opt(&self.arg1)),
            Opcode::LoadAddr => write!(f, "    {} = &{}", opt(&self.result), opt(&self.arg1)),
            Opcode::Index => write!(
                f,
                "    {} = {}[{}]",
                opt(&self.result),
                opt(&self.arg1),
                opt(&self.arg2)
            ),
            Opcode::StoreIndex => write!(
                f,
                "    {}[{}] = {}",
                opt(&self.arg1),
                opt(&self.arg2),
                opt(&self.arg3)
            ),
            Opcode::Cast => write!(f, "    {} = cast {}", opt(&self.result), opt(&self.arg1)),
            Opcode::Nop => write!(f, "    nop"),
            Opcode::Assign => write!(f, "    {} = {}", opt(&self.result), opt(&self.arg1)),
            Opcode::Neg => write!(f, "    {} = -{}", opt(&self.result), opt(&self.arg1)),
            Opcode::Not => write!(f, "    {} = ~{}", opt(&self.result), opt(&self.arg1)),
            Opcode::Lnot => write!(f, "    {} = !{}", opt(&self.result), opt(&self.arg1)),
            Opcode::Phi => write!(f, "    phi"),
            binary => write!(
                f,
                "    {} = {} {} {}",
                opt(&self.result),
                opt(&self.arg1),
                binary.binary_symbol(),
                opt(&self.arg2)
            ),
        }
    }
}

/// IR for one function: parameters, body instructions, and the local
/// variables encountered while lowering it.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: Option<TypeNode>,
    pub instructions: Vec<Instruction>,
    pub local_vars: Vec<String>,
}

impl std::fmt::Display for IrFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "function {}({}):", self.name, self.parameters.join(", "))?;

        if !self.local_vars.is_empty() {
            writeln!(f, "    # Local variables: {}", self.local_vars.join(", "))?;
        }

        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }

        Ok(())
    }
}

/// A complete IR program: functions plus global variables and interned
/// string literals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrProgram {
    pub functions: Vec<IrFunction>,
    pub global_vars: Vec<String>,
    pub string_literals: Vec<(String, String)>,
}

impl IrProgram {
    /// Total number of instructions across all functions.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instructions.len()).sum()
    }
}

impl std::fmt::Display for IrProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.global_vars.is_empty() {
            writeln!(f, "# Global variables:")?;
            for var in &self.global_vars {
                writeln!(f, "global {}", var)?;
            }
            writeln!(f)?;
        }

        if !self.string_literals.is_empty() {
            writeln!(f, "# String literals:")?;
            for (label, value) in &self.string_literals {
                writeln!(f, "{}: \"{}\"", label, value)?;
            }
            writeln!(f)?;
        }

        for function in &self.functions {
            write!(f, "{}", function)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Helper for emitting IR instructions with fresh temporaries and labels.
#[derive(Debug, Default)]
pub struct Builder {
    instructions: Vec<Instruction>,
    temp_counter: usize,
    label_counter: usize,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Allocate a fresh temporary.
    pub fn new_temp(&mut self) -> Value {
        let temp = Value::Temp(format!("t{}", self.temp_counter));
        self.temp_counter += 1;
        temp
    }

    /// Allocate a fresh label with a purpose-describing prefix.
    pub fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Reset for the next function: instructions and counters start over.
    pub fn clear(&mut self) {
        self.instructions.clear();
        self.temp_counter = 0;
        self.label_counter = 0;
    }

    /// Take the emitted instructions, leaving the builder empty.
    pub fn take_instructions(&mut self) -> Vec<Instruction> {
        std::mem::take(&mut self.instructions)
    }

    pub fn last_opcode(&self) -> Option<Opcode> {
        self.instructions.last().map(|i| i.opcode)
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn emit_binary(&mut self, opcode: Opcode, result: Value, arg1: Value, arg2: Value) {
        self.emit(Instruction {
            opcode,
            result: Some(result),
            arg1: Some(arg1),
            arg2: Some(arg2),
            arg3: None,
            label: None,
        });
    }

    pub fn emit_unary(&mut self, opcode: Opcode, result: Value, arg1: Value) {
        self.emit(Instruction {
            opcode,
            result: Some(result),
            arg1: Some(arg1),
            arg2: None,
            arg3: None,
            label: None,
        });
    }

    pub fn emit_assign(&mut self, result: Value, value: Value) {
        self.emit(Instruction::assign(result, value));
    }

    pub fn emit_label(&mut self, label: &str) {
        self.emit(Instruction {
            label: Some(label.to_string()),
            ..Instruction::new(Opcode::Label)
        });
    }

    pub fn emit_goto(&mut self, label: &str) {
        self.emit(Instruction {
            label: Some(label.to_string()),
            ..Instruction::new(Opcode::Goto)
        });
    }

    pub fn emit_if_false(&mut self, condition: Value, label: &str) {
        self.emit(Instruction {
            arg1: Some(condition),
            label: Some(label.to_string()),
            ..Instruction::new(Opcode::IfFalse)
        });
    }

    pub fn emit_if_true(&mut self, condition: Value, label: &str) {
        self.emit(Instruction {
            arg1: Some(condition),
            label: Some(label.to_string()),
            ..Instruction::new(Opcode::IfTrue)
        });
    }

    pub fn emit_param(&mut self, arg: Value) {
        self.emit(Instruction {
            arg1: Some(arg),
            ..Instruction::new(Opcode::Param)
        });
    }

    pub fn emit_call(&mut self, result: Option<Value>, function: Value, arg_count: usize) {
        self.emit(Instruction {
            opcode: Opcode::Call,
            result,
            arg1: Some(function),
            arg2: Some(Value::int(arg_count as i64)),
            arg3: None,
            label: None,
        });
    }

    pub fn emit_return(&mut self, value: Option<Value>) {
        self.emit(Instruction {
            arg1: value,
            ..Instruction::new(Opcode::Return)
        });
    }

    pub fn emit_load(&mut self, result: Value, address: Value) {
        self.emit_unary(Opcode::Load, result, address);
    }

    pub fn emit_store(&mut self, address: Value, value: Value) {
        self.emit(Instruction {
            opcode: Opcode::Store,
            result: Some(address),
            arg1: Some(value),
            arg2: None,
            arg3: None,
            label: None,
        });
    }

    pub fn emit_load_addr(&mut self, result: Value, var: Value) {
        self.emit_unary(Opcode::LoadAddr, result, var);
    }

    pub fn emit_alloc(&mut self, result: Value, size: Value) {
        self.emit_unary(Opcode::Alloc, result, size);
    }

    pub fn emit_free(&mut self, pointer: Value) {
        self.emit(Instruction {
            arg1: Some(pointer),
            ..Instruction::new(Opcode::Free)
        });
    }

    pub fn emit_index(&mut self, result: Value, array: Value, index: Value) {
        self.emit_binary(Opcode::Index, result, array, index);
    }

    pub fn emit_store_index(&mut self, array: Value, index: Value, value: Value) {
        self.emit(Instruction {
            opcode: Opcode::StoreIndex,
            result: None,
            arg1: Some(array),
            arg2: Some(index),
            arg3: Some(value),
            label: None,
        });
    }

    pub fn emit_cast(&mut self, result: Value, value: Value) {
        self.emit_unary(Opcode::Cast, result, value);
    }
}
