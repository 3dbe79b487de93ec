//! IR generation: AST to three-address code
//!
//! A walk over the AST that emits instructions through [`Builder`],
//! evaluating sub-expressions depth-first left-to-right so every operand is
//! materialized before the instruction that consumes it. Control-flow
//! statements lower to labels and conditional jumps; `break` and `continue`
//! resolve against per-construct label stacks.
//!
//! Generation presumes a semantically valid AST and fails fast with an
//! [`IrGenError`] on anything it cannot lower.

use crate::ast::{
    ClassDecl, ConstructorDecl, Declaration, DestructorDecl, Expression, FunctionDecl, Program,
    Statement, TypeNode, VariableDecl,
};
use crate::ir::{Builder, IrFunction, IrProgram, Opcode, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Error raised when the generator meets a construct it cannot lower.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("IR generation error: {0}")]
pub struct IrGenError(pub String);

fn unsupported<T>(what: impl std::fmt::Display) -> Result<T, IrGenError> {
    Err(IrGenError(format!("Unsupported {}", what)))
}

fn binary_opcode(op: &str) -> Option<Opcode> {
    let opcode = match op {
        "+" => Opcode::Add,
        "-" => Opcode::Sub,
        "*" => Opcode::Mul,
        "/" => Opcode::Div,
        "%" => Opcode::Mod,
        "&" => Opcode::And,
        "|" => Opcode::Or,
        "^" => Opcode::Xor,
        "<<" => Opcode::Shl,
        ">>" => Opcode::Shr,
        "&&" => Opcode::Land,
        "||" => Opcode::Lor,
        "==" => Opcode::Eq,
        "!=" => Opcode::Ne,
        "<" => Opcode::Lt,
        "<=" => Opcode::Le,
        ">" => Opcode::Gt,
        ">=" => Opcode::Ge,
        _ => return None,
    };
    Some(opcode)
}

fn compound_opcode(op: &str) -> Option<Opcode> {
    let opcode = match op {
        "+=" => Opcode::Add,
        "-=" => Opcode::Sub,
        "*=" => Opcode::Mul,
        "/=" => Opcode::Div,
        "%=" => Opcode::Mod,
        "&=" => Opcode::And,
        "|=" => Opcode::Or,
        "^=" => Opcode::Xor,
        "<<=" => Opcode::Shl,
        ">>=" => Opcode::Shr,
        _ => return None,
    };
    Some(opcode)
}

/// Byte size used for `sizeof` and `new` allocation sizes.
fn size_of_type(ty: &TypeNode) -> i64 {
    match ty {
        TypeNode::Primitive { name, .. } => match name.as_str() {
            "bool" | "char" => 1,
            "short" => 2,
            "long" | "long long" | "double" => 8,
            _ => 4,
        },
        TypeNode::Pointer { .. } | TypeNode::Reference { .. } | TypeNode::Array { .. } => 8,
        TypeNode::UserDefined { .. } => 8,
    }
}

pub struct IrGenerator {
    builder: Builder,
    functions: Vec<IrFunction>,
    global_vars: Vec<String>,
    string_literals: Vec<(String, String)>,
    string_counter: usize,
    /// AST variable name -> IR value, shared across the walk
    var_map: HashMap<String, Value>,
    current_function: Option<String>,
    local_vars: Vec<String>,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
}

impl Default for IrGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IrGenerator {
    pub fn new() -> Self {
        IrGenerator {
            builder: Builder::new(),
            functions: Vec::new(),
            global_vars: Vec::new(),
            string_literals: Vec::new(),
            string_counter: 0,
            var_map: HashMap::new(),
            current_function: None,
            local_vars: Vec::new(),
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
        }
    }

    /// Generate IR for a whole program.
    pub fn generate(mut self, program: &Program) -> Result<IrProgram, IrGenError> {
        for declaration in &program.declarations {
            self.gen_declaration(declaration)?;
        }

        Ok(IrProgram {
            functions: self.functions,
            global_vars: self.global_vars,
            string_literals: self.string_literals,
        })
    }

    fn gen_declaration(&mut self, decl: &Declaration) -> Result<(), IrGenError> {
        match decl {
            Declaration::Variable(var) => {
                self.gen_variable(var)?;
                Ok(())
            }
            Declaration::Function(func) => self.gen_function(func),
            Declaration::Class(class) => self.gen_class(class),
            Declaration::Constructor(ctor) => self.gen_constructor(ctor),
            Declaration::Destructor(dtor) => self.gen_destructor(dtor),
            Declaration::Namespace(ns) => {
                for inner in &ns.declarations {
                    self.gen_declaration(inner)?;
                }
                Ok(())
            }
            // No code to emit: types and names only
            Declaration::Enum(_)
            | Declaration::Using(_)
            | Declaration::Typedef(_)
            | Declaration::Template(_)
            | Declaration::AccessSpecifier(_) => Ok(()),
        }
    }

    fn gen_variable(&mut self, var: &VariableDecl) -> Result<Value, IrGenError> {
        let value = Value::Variable(var.name.clone());

        if self.current_function.is_none() {
            self.global_vars.push(var.name.clone());
            self.var_map.insert(var.name.clone(), value.clone());
            return Ok(value);
        }

        self.local_vars.push(var.name.clone());
        self.var_map.insert(var.name.clone(), value.clone());

        if let Some(initializer) = &var.initializer {
            let init_value = self.gen_expression(initializer)?;
            self.builder.emit_assign(value.clone(), init_value);
        }

        Ok(value)
    }

    fn gen_function(&mut self, func: &FunctionDecl) -> Result<(), IrGenError> {
        let Some(body) = &func.body else {
            // Prototype without body
            return Ok(());
        };

        self.current_function = Some(func.name.clone());
        self.local_vars = Vec::new();
        self.builder.clear();

        let mut parameters = Vec::new();
        for param in &func.parameters {
            parameters.push(param.name.clone());
            self.var_map
                .insert(param.name.clone(), Value::Variable(param.name.clone()));
        }

        for statement in body {
            self.gen_statement(statement)?;
        }

        // Epilogue: guarantee the function ends with a return
        if self.builder.last_opcode() != Some(Opcode::Return) {
            self.builder.emit_return(None);
        }

        self.functions.push(IrFunction {
            name: func.name.clone(),
            parameters,
            return_type: Some(func.return_type.clone()),
            instructions: self.builder.take_instructions(),
            local_vars: std::mem::take(&mut self.local_vars),
        });
        self.current_function = None;
        Ok(())
    }

    fn gen_class(&mut self, class: &ClassDecl) -> Result<(), IrGenError> {
        // Only code-bearing members lower to IR
        for member in &class.members {
            match member {
                Declaration::Function(func) => self.gen_function(func)?,
                Declaration::Constructor(ctor) => self.gen_constructor(ctor)?,
                Declaration::Destructor(dtor) => self.gen_destructor(dtor)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn gen_constructor(&mut self, ctor: &ConstructorDecl) -> Result<(), IrGenError> {
        let name = format!("{}::constructor", ctor.class_name);
        self.current_function = Some(name.clone());
        self.local_vars = Vec::new();
        self.builder.clear();

        let mut parameters = Vec::new();
        for param in &ctor.parameters {
            parameters.push(param.name.clone());
            self.var_map
                .insert(param.name.clone(), Value::Variable(param.name.clone()));
        }

        // Member initializers lower to plain member assignments
        for initializer in &ctor.initializers {
            let value = self.gen_expression(&initializer.value)?;
            self.builder
                .emit_assign(Value::Variable(initializer.member.clone()), value);
        }

        if let Some(body) = &ctor.body {
            for statement in body {
                self.gen_statement(statement)?;
            }
        }

        self.builder.emit_return(None);

        self.functions.push(IrFunction {
            name,
            parameters,
            return_type: None,
            instructions: self.builder.take_instructions(),
            local_vars: std::mem::take(&mut self.local_vars),
        });
        self.current_function = None;
        Ok(())
    }

    fn gen_destructor(&mut self, dtor: &DestructorDecl) -> Result<(), IrGenError> {
        let name = format!("{}::destructor", dtor.class_name);
        self.current_function = Some(name.clone());
        self.local_vars = Vec::new();
        self.builder.clear();

        if let Some(body) = &dtor.body {
            for statement in body {
                self.gen_statement(statement)?;
            }
        }

        self.builder.emit_return(None);

        self.functions.push(IrFunction {
            name,
            parameters: Vec::new(),
            return_type: None,
            instructions: self.builder.take_instructions(),
            local_vars: std::mem::take(&mut self.local_vars),
        });
        self.current_function = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn gen_statement(&mut self, stmt: &Statement) -> Result<(), IrGenError> {
        match stmt {
            Statement::Compound(statements) => {
                for statement in statements {
                    self.gen_statement(statement)?;
                }
                Ok(())
            }
            Statement::Expression(expr) => {
                self.gen_expression(expr)?;
                Ok(())
            }
            Statement::Declaration(decl) => self.gen_declaration(decl),
            Statement::Return(value) => {
                let return_value = match value {
                    Some(expr) => Some(self.gen_expression(expr)?),
                    None => None,
                };
                self.builder.emit_return(return_value);
                Ok(())
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.gen_expression(condition)?;
                let else_label = self.builder.new_label("else");
                let end_label = self.builder.new_label("endif");

                self.builder.emit_if_false(condition, &else_label);
                self.gen_statement(then_branch)?;
                self.builder.emit_goto(&end_label);

                self.builder.emit_label(&else_label);
                if let Some(else_branch) = else_branch {
                    self.gen_statement(else_branch)?;
                }

                self.builder.emit_label(&end_label);
                Ok(())
            }
            Statement::While { condition, body } => {
                let start_label = self.builder.new_label("while_start");
                let end_label = self.builder.new_label("while_end");

                self.break_labels.push(end_label.clone());
                self.continue_labels.push(start_label.clone());

                self.builder.emit_label(&start_label);
                let condition = self.gen_expression(condition)?;
                self.builder.emit_if_false(condition, &end_label);

                self.gen_statement(body)?;
                self.builder.emit_goto(&start_label);
                self.builder.emit_label(&end_label);

                self.break_labels.pop();
                self.continue_labels.pop();
                Ok(())
            }
            Statement::DoWhile { body, condition } => {
                let start_label = self.builder.new_label("do_start");
                let end_label = self.builder.new_label("do_end");

                self.break_labels.push(end_label.clone());
                self.continue_labels.push(start_label.clone());

                self.builder.emit_label(&start_label);
                self.gen_statement(body)?;

                let condition = self.gen_expression(condition)?;
                self.builder.emit_if_true(condition, &start_label);
                self.builder.emit_label(&end_label);

                self.break_labels.pop();
                self.continue_labels.pop();
                Ok(())
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
            } => {
                let start_label = self.builder.new_label("for_start");
                let increment_label = self.builder.new_label("for_incr");
                let end_label = self.builder.new_label("for_end");

                self.break_labels.push(end_label.clone());
                // continue jumps to the increment, not the condition
                self.continue_labels.push(increment_label.clone());

                if let Some(init) = init {
                    self.gen_statement(init)?;
                }

                self.builder.emit_label(&start_label);
                if let Some(condition) = condition {
                    let condition = self.gen_expression(condition)?;
                    self.builder.emit_if_false(condition, &end_label);
                }

                self.gen_statement(body)?;

                self.builder.emit_label(&increment_label);
                if let Some(increment) = increment {
                    self.gen_expression(increment)?;
                }

                self.builder.emit_goto(&start_label);
                self.builder.emit_label(&end_label);

                self.break_labels.pop();
                self.continue_labels.pop();
                Ok(())
            }
            Statement::Break => {
                if let Some(label) = self.break_labels.last() {
                    let label = label.clone();
                    self.builder.emit_goto(&label);
                }
                Ok(())
            }
            Statement::Continue => {
                if let Some(label) = self.continue_labels.last() {
                    let label = label.clone();
                    self.builder.emit_goto(&label);
                }
                Ok(())
            }
            Statement::Switch { condition, cases } => {
                let switch_value = self.gen_expression(condition)?;
                let end_label = self.builder.new_label("switch_end");
                self.break_labels.push(end_label.clone());

                // One label per arm, allocated up front
                let mut case_labels = Vec::new();
                let mut default_label = None;
                for case in cases {
                    if case.value.is_none() {
                        default_label = Some(self.builder.new_label("default"));
                    } else {
                        case_labels.push(self.builder.new_label("case"));
                    }
                }

                // Dispatch chain: compare and jump per non-default case
                let mut case_index = 0;
                for case in cases {
                    if let Some(value) = &case.value {
                        let case_value = self.gen_expression(value)?;
                        let temp = self.builder.new_temp();
                        self.builder.emit_binary(
                            Opcode::Eq,
                            temp.clone(),
                            switch_value.clone(),
                            case_value,
                        );
                        self.builder.emit_if_true(temp, &case_labels[case_index]);
                        case_index += 1;
                    }
                }

                match &default_label {
                    Some(label) => self.builder.emit_goto(label),
                    None => self.builder.emit_goto(&end_label),
                }

                // Case bodies in source order; fall-through is implicit
                let mut case_index = 0;
                for case in cases {
                    match (&case.value, &default_label) {
                        (None, Some(label)) => {
                            let label = label.clone();
                            self.builder.emit_label(&label);
                        }
                        _ => {
                            self.builder.emit_label(&case_labels[case_index].clone());
                            case_index += 1;
                        }
                    }
                    for statement in &case.body {
                        self.gen_statement(statement)?;
                    }
                }

                self.builder.emit_label(&end_label);
                self.break_labels.pop();
                Ok(())
            }
            Statement::Try { .. } => unsupported("statement: try/catch"),
            Statement::Throw(_) => unsupported("statement: throw"),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn gen_expression(&mut self, expr: &Expression) -> Result<Value, IrGenError> {
        match expr {
            Expression::IntegerLit(v) => Ok(Value::int(*v)),
            Expression::FloatLit(v) => Ok(Value::Constant(crate::ir::Const::Float(*v))),
            Expression::CharLit(c) => Ok(Value::int(*c as i64)),
            Expression::BoolLit(b) => Ok(Value::int(i64::from(*b))),
            Expression::NullptrLit => Ok(Value::int(0)),
            Expression::StringLit(s) => {
                // Intern into the program's string table
                let label = format!("str{}", self.string_counter);
                self.string_counter += 1;
                self.string_literals.push((label.clone(), s.clone()));
                Ok(Value::Label(label))
            }
            Expression::Identifier(name) => match self.var_map.get(name) {
                Some(value) => Ok(value.clone()),
                None => {
                    let value = Value::Variable(name.clone());
                    self.var_map.insert(name.clone(), value.clone());
                    Ok(value)
                }
            },
            Expression::Binary { left, op, right } => {
                let left = self.gen_expression(left)?;
                let right = self.gen_expression(right)?;

                let Some(opcode) = binary_opcode(op) else {
                    return unsupported(format_args!("binary operator: {}", op));
                };
                let result = self.builder.new_temp();
                self.builder
                    .emit_binary(opcode, result.clone(), left, right);
                Ok(result)
            }
            Expression::Unary {
                op,
                operand,
                is_postfix,
            } => self.gen_unary(op, operand, *is_postfix),
            Expression::Assignment { target, op, value } => {
                let value = self.gen_expression(value)?;
                let target = self.gen_expression(target)?;

                if op == "=" {
                    self.builder.emit_assign(target.clone(), value);
                    return Ok(target);
                }

                // Compound assignment: x op= y expands to t = x op y; x = t
                let Some(opcode) = compound_opcode(op) else {
                    return unsupported(format_args!("assignment operator: {}", op));
                };
                let temp = self.builder.new_temp();
                self.builder
                    .emit_binary(opcode, temp.clone(), target.clone(), value);
                self.builder.emit_assign(target.clone(), temp);
                Ok(target)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                // Arguments are pushed left to right
                for argument in arguments {
                    let value = self.gen_expression(argument)?;
                    self.builder.emit_param(value);
                }

                let function_value = match function.as_ref() {
                    Expression::Identifier(name) => Value::Variable(name.clone()),
                    other => self.gen_expression(other)?,
                };

                let result = self.builder.new_temp();
                self.builder
                    .emit_call(Some(result.clone()), function_value, arguments.len());
                Ok(result)
            }
            Expression::ArrayAccess { array, index } => {
                let array = self.gen_expression(array)?;
                let index = self.gen_expression(index)?;
                let result = self.builder.new_temp();
                self.builder.emit_index(result.clone(), array, index);
                Ok(result)
            }
            Expression::MemberAccess { object, member, .. } => {
                // Lowered to a dotted variable name; field offsets are a
                // back-end concern
                let object = self.gen_expression(object)?;
                Ok(Value::Variable(format!("{}.{}", object, member)))
            }
            Expression::Ternary {
                condition,
                true_expr,
                false_expr,
            } => {
                let condition = self.gen_expression(condition)?;

                let true_label = self.builder.new_label("ternary_true");
                let false_label = self.builder.new_label("ternary_false");
                let end_label = self.builder.new_label("ternary_end");
                let result = self.builder.new_temp();

                self.builder.emit_if_false(condition, &false_label);

                self.builder.emit_label(&true_label);
                let true_value = self.gen_expression(true_expr)?;
                self.builder.emit_assign(result.clone(), true_value);
                self.builder.emit_goto(&end_label);

                self.builder.emit_label(&false_label);
                let false_value = self.gen_expression(false_expr)?;
                self.builder.emit_assign(result.clone(), false_value);

                self.builder.emit_label(&end_label);
                Ok(result)
            }
            Expression::Cast { expr, .. } => {
                let value = self.gen_expression(expr)?;
                let result = self.builder.new_temp();
                self.builder.emit_cast(result.clone(), value);
                Ok(result)
            }
            Expression::New { allocated_type, .. } => {
                let size = Value::int(size_of_type(allocated_type));
                let result = self.builder.new_temp();
                self.builder.emit_alloc(result.clone(), size);
                Ok(result)
            }
            Expression::Delete { expr, .. } => {
                let pointer = self.gen_expression(expr)?;
                self.builder.emit_free(pointer.clone());
                Ok(pointer)
            }
            Expression::Sizeof(ty) => Ok(Value::int(size_of_type(ty))),
            Expression::This => Ok(Value::Variable("this".to_string())),
            Expression::Lambda { .. } => unsupported("expression: lambda"),
        }
    }

    fn gen_unary(
        &mut self,
        op: &str,
        operand: &Expression,
        is_postfix: bool,
    ) -> Result<Value, IrGenError> {
        let operand = self.gen_expression(operand)?;

        let simple = match op {
            "-" => Some(Opcode::Neg),
            "~" => Some(Opcode::Not),
            "!" => Some(Opcode::Lnot),
            _ => None,
        };
        if let Some(opcode) = simple {
            let result = self.builder.new_temp();
            self.builder.emit_unary(opcode, result.clone(), operand);
            return Ok(result);
        }

        if op == "++" || op == "--" {
            let opcode = if op == "++" { Opcode::Add } else { Opcode::Sub };
            let result = self.builder.new_temp();
            self.builder
                .emit_binary(opcode, result.clone(), operand.clone(), Value::int(1));
            self.builder.emit_assign(operand.clone(), result.clone());

            // Postfix yields the variable, prefix the fresh temp
            return Ok(if is_postfix { operand } else { result });
        }

        if op == "&" {
            let result = self.builder.new_temp();
            self.builder.emit_load_addr(result.clone(), operand);
            return Ok(result);
        }

        if op == "*" {
            let result = self.builder.new_temp();
            self.builder.emit_load(result.clone(), operand);
            return Ok(result);
        }

        unsupported(format_args!("unary operator: {}", op))
    }
}

/// Generate IR for a program with a fresh generator.
pub fn generate_ir(program: &Program) -> Result<IrProgram, IrGenError> {
    IrGenerator::new().generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn lower(source: &str) -> IrProgram {
        let program = Parser::from_source(source).unwrap().parse().unwrap();
        generate_ir(&program).unwrap()
    }

    fn func<'a>(program: &'a IrProgram, name: &str) -> &'a IrFunction {
        program
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("function '{}' not generated", name))
    }

    fn opcodes(function: &IrFunction) -> Vec<Opcode> {
        function.instructions.iter().map(|i| i.opcode).collect()
    }

    fn count_opcode(function: &IrFunction, opcode: Opcode) -> usize {
        function
            .instructions
            .iter()
            .filter(|i| i.opcode == opcode)
            .count()
    }

    fn assert_labels_unique(function: &IrFunction) {
        let mut seen = std::collections::HashSet::new();
        for instr in &function.instructions {
            if instr.opcode == Opcode::Label {
                let label = instr.label.clone().unwrap();
                assert!(seen.insert(label.clone()), "duplicate label {}", label);
            }
        }
    }

    fn assert_jump_targets_defined(function: &IrFunction) {
        let defined: std::collections::HashSet<_> = function
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Label)
            .filter_map(|i| i.label.clone())
            .collect();
        for instr in &function.instructions {
            if matches!(instr.opcode, Opcode::Goto | Opcode::IfFalse | Opcode::IfTrue) {
                let target = instr.label.as_ref().unwrap();
                assert!(defined.contains(target), "undefined jump target {}", target);
            }
        }
    }

    #[test]
    fn test_simple_add_function() {
        let program = lower("int add(int a, int b) { return a + b; }");
        let add = func(&program, "add");
        assert_eq!(add.parameters, vec!["a", "b"]);

        assert_eq!(opcodes(add), vec![Opcode::Add, Opcode::Return]);

        let add_instr = &add.instructions[0];
        assert_eq!(add_instr.arg1, Some(Value::Variable("a".to_string())));
        assert_eq!(add_instr.arg2, Some(Value::Variable("b".to_string())));
        let temp = add_instr.result.clone().unwrap();
        assert_eq!(add.instructions[1].arg1, Some(temp));
    }

    #[test]
    fn test_epilogue_return_added() {
        let program = lower("void noop() { }");
        let f = func(&program, "noop");
        assert_eq!(opcodes(f), vec![Opcode::Return]);
    }

    #[test]
    fn test_no_double_return() {
        let program = lower("int one() { return 1; }");
        let f = func(&program, "one");
        assert_eq!(count_opcode(f, Opcode::Return), 1);
    }

    #[test]
    fn test_if_else_shape() {
        let program = lower("int max(int a, int b) { if (a > b) { return a; } else { return b; } }");
        let f = func(&program, "max");

        // GT, IF_FALSE else, RETURN a, GOTO end, LABEL else, RETURN b,
        // LABEL end, epilogue RETURN
        assert_eq!(
            opcodes(f),
            vec![
                Opcode::Gt,
                Opcode::IfFalse,
                Opcode::Return,
                Opcode::Goto,
                Opcode::Label,
                Opcode::Return,
                Opcode::Label,
                Opcode::Return,
            ]
        );
        assert!(f.instructions[1].label.as_ref().unwrap().starts_with("else"));
        assert!(f.instructions[3].label.as_ref().unwrap().starts_with("endif"));
        assert_labels_unique(f);
        assert_jump_targets_defined(f);
    }

    #[test]
    fn test_while_lowering() {
        let program = lower("int f(int n) { while (n > 0) { n = n - 1; } return n; }");
        let f = func(&program, "f");
        let ops = opcodes(f);

        assert_eq!(ops[0], Opcode::Label); // while_start
        assert_eq!(ops[1], Opcode::Gt);
        assert_eq!(ops[2], Opcode::IfFalse);
        // back edge jumps to the start label
        let goto = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Goto)
            .unwrap();
        assert!(goto.label.as_ref().unwrap().starts_with("while_start"));
        assert_labels_unique(f);
        assert_jump_targets_defined(f);
    }

    #[test]
    fn test_do_while_lowering() {
        let program = lower("int f(int n) { do { n = n - 1; } while (n > 0); return n; }");
        let f = func(&program, "f");

        assert_eq!(f.instructions[0].opcode, Opcode::Label);
        assert!(
            f.instructions[0]
                .label
                .as_ref()
                .unwrap()
                .starts_with("do_start")
        );
        // Condition test is an IF_TRUE back to the start
        let if_true = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::IfTrue)
            .unwrap();
        assert!(if_true.label.as_ref().unwrap().starts_with("do_start"));
        assert_labels_unique(f);
    }

    #[test]
    fn test_for_lowering_s6() {
        let program =
            lower("int f(int n) { int s = 0; for (int i = 1; i <= n; i++) s = s + i; return s; }");
        let f = func(&program, "f");

        // Exactly one LE comparison in the loop condition
        assert_eq!(count_opcode(f, Opcode::Le), 1);
        // Two ADDs: the body update and the increment
        assert_eq!(count_opcode(f, Opcode::Add), 2);

        // The continue-target (increment label) sits between the body and
        // the loop back-edge GOTO
        let incr_index = f
            .instructions
            .iter()
            .position(|i| {
                i.opcode == Opcode::Label && i.label.as_deref().unwrap_or("").starts_with("for_incr")
            })
            .expect("for_incr label missing");
        let backedge_index = f
            .instructions
            .iter()
            .position(|i| {
                i.opcode == Opcode::Goto
                    && i.label.as_deref().unwrap_or("").starts_with("for_start")
            })
            .expect("loop back-edge missing");
        let body_add_index = f
            .instructions
            .iter()
            .position(|i| i.opcode == Opcode::Add)
            .unwrap();
        assert!(body_add_index < incr_index);
        assert!(incr_index < backedge_index);
        assert_labels_unique(f);
        assert_jump_targets_defined(f);
    }

    #[test]
    fn test_break_and_continue_targets() {
        let program =
            lower("int f(int n) { while (1) { if (n > 3) { break; } continue; } return n; }");
        let f = func(&program, "f");

        let gotos: Vec<&str> = f
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Goto)
            .map(|i| i.label.as_deref().unwrap())
            .collect();
        assert!(gotos.iter().any(|l| l.starts_with("while_end")), "break should target the loop end: {:?}", gotos);
        assert!(
            gotos.iter().filter(|l| l.starts_with("while_start")).count() >= 2,
            "continue and back edge should target the loop start: {:?}",
            gotos
        );
    }

    #[test]
    fn test_switch_lowering() {
        let program = lower(
            "int f(int x) { switch (x) { case 1: return 10; case 2: return 20; default: return 0; } }",
        );
        let f = func(&program, "f");

        // The discriminant is compared once per non-default case
        assert_eq!(count_opcode(f, Opcode::Eq), 2);
        assert_eq!(count_opcode(f, Opcode::IfTrue), 2);

        // No-match path jumps to the default label
        let dispatch_goto = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Goto)
            .unwrap();
        assert!(dispatch_goto.label.as_ref().unwrap().starts_with("default"));
        assert_labels_unique(f);
        assert_jump_targets_defined(f);
    }

    #[test]
    fn test_switch_without_default_jumps_to_end() {
        let program = lower("int f(int x) { switch (x) { case 1: break; } return 0; }");
        let f = func(&program, "f");
        let dispatch_goto = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Goto)
            .unwrap();
        assert!(
            dispatch_goto
                .label
                .as_ref()
                .unwrap()
                .starts_with("switch_end")
        );
    }

    #[test]
    fn test_ternary_lowering() {
        let program = lower("int f(int a, int b) { return a > b ? a : b; }");
        let f = func(&program, "f");
        let ops = opcodes(f);
        assert_eq!(
            ops,
            vec![
                Opcode::Gt,
                Opcode::IfFalse,
                Opcode::Label,  // ternary_true
                Opcode::Assign, // result = a
                Opcode::Goto,
                Opcode::Label,  // ternary_false
                Opcode::Assign, // result = b
                Opcode::Label,  // ternary_end
                Opcode::Return,
            ]
        );
        // Both assignments target the same temp
        assert_eq!(f.instructions[3].result, f.instructions[6].result);
    }

    #[test]
    fn test_assignment_and_compound() {
        let program = lower("int f(int x) { x = 1; x += 2; return x; }");
        let f = func(&program, "f");
        let ops = opcodes(f);
        // x = 1; t = x + 2; x = t; return x; (epilogue not needed)
        assert_eq!(
            ops,
            vec![Opcode::Assign, Opcode::Add, Opcode::Assign, Opcode::Return]
        );
        assert_eq!(
            f.instructions[1].arg1,
            Some(Value::Variable("x".to_string()))
        );
    }

    #[test]
    fn test_increment_postfix_vs_prefix() {
        let program = lower("int f(int x) { x++; return x; }");
        let f = func(&program, "f");
        // t = x + 1; x = t
        assert_eq!(f.instructions[0].opcode, Opcode::Add);
        assert_eq!(f.instructions[1].opcode, Opcode::Assign);
        assert_eq!(
            f.instructions[1].result,
            Some(Value::Variable("x".to_string()))
        );

        let program = lower("int g(int x) { int y = ++x; return y; }");
        let g = func(&program, "g");
        // t0 = x + 1; x = t0; y = t0
        assert_eq!(g.instructions[2].opcode, Opcode::Assign);
        assert_eq!(
            g.instructions[2].arg1,
            Some(Value::Temp("t0".to_string()))
        );
    }

    #[test]
    fn test_call_params_left_to_right() {
        let program = lower("int f() { return g(1, 2, 3); }");
        let f = func(&program, "f");
        let params: Vec<_> = f
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Param)
            .map(|i| i.arg1.clone().unwrap())
            .collect();
        assert_eq!(params, vec![Value::int(1), Value::int(2), Value::int(3)]);

        let call = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Call)
            .unwrap();
        assert_eq!(call.arg1, Some(Value::Variable("g".to_string())));
        assert_eq!(call.arg2, Some(Value::int(3)));
        assert!(call.result.is_some());
    }

    #[test]
    fn test_string_literal_interning() {
        let program = lower(r#"int f() { log("one"); log("two"); return 0; }"#);
        assert_eq!(
            program.string_literals,
            vec![
                ("str0".to_string(), "one".to_string()),
                ("str1".to_string(), "two".to_string()),
            ]
        );
        let f = func(&program, "f");
        let first_param = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Param)
            .unwrap();
        assert_eq!(first_param.arg1, Some(Value::Label("str0".to_string())));
    }

    #[test]
    fn test_array_access_and_store_shape() {
        let program = lower("int f(int* a, int i) { return a[i]; }");
        let f = func(&program, "f");
        assert_eq!(f.instructions[0].opcode, Opcode::Index);
    }

    #[test]
    fn test_address_of_and_deref() {
        let program = lower("int f(int* p, int x) { int y = *p; int* q = &x; return y; }");
        let f = func(&program, "f");
        assert_eq!(count_opcode(f, Opcode::Load), 1);
        assert_eq!(count_opcode(f, Opcode::LoadAddr), 1);
    }

    #[test]
    fn test_new_and_delete() {
        let program = lower("int f() { int* p = new int; delete p; return 0; }");
        let f = func(&program, "f");
        assert_eq!(count_opcode(f, Opcode::Alloc), 1);
        assert_eq!(count_opcode(f, Opcode::Free), 1);
        let alloc = f
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Alloc)
            .unwrap();
        assert_eq!(alloc.arg1, Some(Value::int(4)));
    }

    #[test]
    fn test_sizeof_is_constant() {
        let program = lower("int f() { return sizeof(double); }");
        let f = func(&program, "f");
        assert_eq!(f.instructions[0].arg1, Some(Value::int(8)));
    }

    #[test]
    fn test_cast_emits_cast() {
        let program = lower("int f(double d) { return static_cast<int>(d); }");
        let f = func(&program, "f");
        assert_eq!(count_opcode(f, Opcode::Cast), 1);
    }

    #[test]
    fn test_globals_collected() {
        let program = lower("int counter = 0;\nint f() { return counter; }");
        assert_eq!(program.global_vars, vec!["counter"]);
    }

    #[test]
    fn test_constructor_lowering() {
        let program = lower("class C { public: int v; C(int x) : v(x) { } ~C() { } };");
        let ctor = func(&program, "C::constructor");
        assert_eq!(ctor.parameters, vec!["x"]);
        assert_eq!(ctor.instructions[0].opcode, Opcode::Assign);
        assert_eq!(
            ctor.instructions[0].result,
            Some(Value::Variable("v".to_string()))
        );
        assert_eq!(ctor.instructions.last().unwrap().opcode, Opcode::Return);

        let dtor = func(&program, "C::destructor");
        assert_eq!(dtor.instructions.last().unwrap().opcode, Opcode::Return);
    }

    #[test]
    fn test_temps_monotonic_per_function() {
        let program = lower("int f(int a) { return a + a; }\nint g(int b) { return b * b; }");
        let g = func(&program, "g");
        // Counters reset per function: g's first temp is t0 again
        assert_eq!(g.instructions[0].result, Some(Value::Temp("t0".to_string())));
    }

    #[test]
    fn test_functions_end_with_return() {
        let program = lower(
            "int f(int n) { if (n) { return 1; } return 0; }\nvoid g() { }\nint h(int x) { while (x) { x = x - 1; } return x; }",
        );
        for function in &program.functions {
            assert_eq!(
                function.instructions.last().unwrap().opcode,
                Opcode::Return,
                "function {} must end with return",
                function.name
            );
        }
    }

    #[test]
    fn test_temps_defined_before_use() {
        let program =
            lower("int f(int n) { int s = 0; for (int i = 1; i <= n; i++) s = s + i; return s; }");
        let f = func(&program, "f");

        let mut defined = std::collections::HashSet::new();
        for instr in &f.instructions {
            for arg in [&instr.arg1, &instr.arg2, &instr.arg3].into_iter().flatten() {
                if let Value::Temp(name) = arg {
                    assert!(defined.contains(name), "temp {} used before definition", name);
                }
            }
            if let Some(Value::Temp(name)) = &instr.result {
                defined.insert(name.clone());
            }
        }
    }

    #[test]
    fn test_try_is_rejected() {
        let program = Parser::from_source("int f() { try { return 1; } catch (int e) { } return 0; }")
            .unwrap()
            .parse()
            .unwrap();
        let err = generate_ir(&program).unwrap_err();
        assert!(err.0.contains("try"));
    }

    #[test]
    fn test_generation_is_stable_modulo_fresh_builder() {
        let source = "int f(int n) { int s = 0; while (n) { s += n; n--; } return s; }";
        let program = Parser::from_source(source).unwrap().parse().unwrap();
        let first = generate_ir(&program).unwrap();
        let second = generate_ir(&program).unwrap();
        assert_eq!(first, second);
    }
}
