//! Semantic analysis: symbol table construction and type checking
//!
//! A single walk over the AST that populates the symbol table and type
//! registry and validates every expression against the rules in
//! [`crate::typecheck`]. Unlike the lexer and parser, analysis is
//! error-accumulating: each failure is recorded as a diagnostic string and
//! the walk continues with an `int` placeholder type, so one run can
//! surface many problems.
//!
//! Scope discipline is strictly stack-shaped. Every `enter_*` is paired
//! with an `exit_*` before the enclosing visit returns, which keeps the
//! scope cursor at the global root when analysis completes.

use crate::ast::{
    ClassDecl, ConstructorDecl, Declaration, DestructorDecl, EnumDecl, Expression, FunctionDecl,
    Program, Statement, TypeNode, VariableDecl,
};
use crate::symbols::{
    FunctionSignature, SymbolAttributes, SymbolKind, SymbolTable, TypeDefKind, TypeRegistry,
};
use crate::typecheck;

pub struct SemanticAnalyzer {
    pub symbols: SymbolTable,
    pub registry: TypeRegistry,
    pub errors: Vec<String>,
    in_loop: bool,
    in_switch: bool,
    current_return_type: Option<TypeNode>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        SemanticAnalyzer {
            symbols: SymbolTable::new(),
            registry: TypeRegistry::new(),
            errors: Vec::new(),
            in_loop: false,
            in_switch: false,
            current_return_type: None,
        }
    }

    /// Analyze a program. Returns `true` iff no errors were recorded.
    pub fn analyze(&mut self, program: &Program) -> bool {
        for declaration in &program.declarations {
            self.visit_declaration(declaration);
        }
        self.errors.is_empty()
    }

    fn record(&mut self, message: impl Into<String>) {
        self.errors.push(format!("Semantic error: {}", message.into()));
    }

    /// Placeholder type used to keep walking after a failure.
    fn placeholder() -> TypeNode {
        TypeNode::primitive("int")
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn visit_declaration(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Variable(var) => self.visit_variable(var),
            Declaration::Function(func) => self.visit_function(func),
            Declaration::Class(class) => self.visit_class(class),
            Declaration::Constructor(ctor) => self.visit_constructor(ctor),
            Declaration::Destructor(dtor) => self.visit_destructor(dtor),
            Declaration::Namespace(ns) => {
                self.symbols.enter_namespace(&ns.name);
                for inner in &ns.declarations {
                    self.visit_declaration(inner);
                }
                if let Err(e) = self.symbols.exit_namespace() {
                    self.record(format!("Namespace error: {}", e));
                }
            }
            Declaration::Enum(decl) => self.visit_enum(decl),
            Declaration::Typedef(td) => {
                if let Err(e) = self.symbols.define(
                    &td.new_name,
                    SymbolKind::Typedef,
                    td.original_type.clone(),
                    SymbolAttributes::default(),
                ) {
                    self.record(format!("Typedef error: {}", e));
                }
            }
            // Using-declarations introduce no bindings the checker models
            Declaration::Using(_) => {}
            Declaration::Template(template) => {
                // Templates are parsed but not instantiated; analyze the
                // underlying declaration as-is
                self.visit_declaration(&template.declaration);
            }
            // Access control is tracked in source order but not enforced
            Declaration::AccessSpecifier(_) => {}
        }
    }

    fn visit_variable(&mut self, var: &VariableDecl) {
        let attributes = SymbolAttributes {
            is_static: var.is_static,
            is_extern: var.is_extern,
            is_constexpr: var.is_constexpr,
            ..SymbolAttributes::default()
        };
        if let Err(e) = self.symbols.define(
            &var.name,
            SymbolKind::Variable,
            var.var_type.clone(),
            attributes,
        ) {
            self.record(format!("Variable declaration error: {}", e));
        }

        if let Some(initializer) = &var.initializer {
            let init_type = self.check_expression(initializer);
            if !typecheck::is_compatible(&init_type, &var.var_type, &self.registry) {
                self.record(format!(
                    "Cannot initialize variable '{}' of type {} with value of type {}",
                    var.name, var.var_type, init_type
                ));
            }
        }
    }

    fn visit_function(&mut self, func: &FunctionDecl) {
        let signature = FunctionSignature {
            return_type: func.return_type.clone(),
            parameter_types: func
                .parameters
                .iter()
                .map(|p| p.param_type.clone())
                .collect(),
            is_const: func.is_const,
            is_static: func.is_static,
            is_virtual: func.is_virtual,
        };
        let attributes = SymbolAttributes {
            is_static: func.is_static,
            is_inline: func.is_inline,
            is_virtual: func.is_virtual,
            is_override: func.is_override,
            is_const: func.is_const,
            ..SymbolAttributes::default()
        };
        if let Err(e) = self.symbols.define_function(&func.name, signature, attributes) {
            self.record(format!("Function declaration error: {}", e));
        }

        if let Some(body) = &func.body {
            self.symbols.enter_function(&func.name);

            let saved_return_type = self.current_return_type.take();
            self.current_return_type = Some(func.return_type.clone());

            for param in &func.parameters {
                self.define_parameter(&param.name, &param.param_type);
            }

            self.visit_block(body);

            self.current_return_type = saved_return_type;
            if let Err(e) = self.symbols.exit_function() {
                self.record(format!("Function declaration error: {}", e));
            }
        }
    }

    fn define_parameter(&mut self, name: &str, param_type: &TypeNode) {
        if name.is_empty() {
            return;
        }
        if let Err(e) = self.symbols.define(
            name,
            SymbolKind::Parameter,
            param_type.clone(),
            SymbolAttributes::default(),
        ) {
            self.record(format!("Parameter error: {}", e));
        }
    }

    fn visit_class(&mut self, class: &ClassDecl) {
        let kind = if class.is_struct {
            TypeDefKind::Struct
        } else {
            TypeDefKind::Class
        };
        if let Err(e) = self
            .registry
            .register_class(&class.name, kind, class.base_classes.clone())
        {
            self.record(format!("Class declaration error: {}", e));
        }

        let attributes = SymbolAttributes {
            is_struct: class.is_struct,
            ..SymbolAttributes::default()
        };
        if let Err(e) = self.symbols.define(
            &class.name,
            SymbolKind::Class,
            TypeNode::UserDefined {
                name: class.name.clone(),
                is_const: false,
            },
            attributes,
        ) {
            self.record(format!("Class declaration error: {}", e));
        }

        self.symbols.enter_class(&class.name);

        for member in &class.members {
            match member {
                Declaration::Variable(var) => {
                    self.visit_variable(var);
                    self.register_member(&class.name, &var.name);
                }
                Declaration::Function(func) => {
                    self.visit_function(func);
                    self.register_member(&class.name, &func.name);
                }
                other => self.visit_declaration(other),
            }
        }

        if let Err(e) = self.symbols.exit_class() {
            self.record(format!("Class declaration error: {}", e));
        }
    }

    fn register_member(&mut self, class_name: &str, member_name: &str) {
        let Some(symbol) = self.symbols.lookup(member_name).cloned() else {
            return;
        };
        if let Err(e) = self.registry.add_class_member(class_name, symbol) {
            self.record(format!("Class declaration error: {}", e));
        }
    }

    fn visit_constructor(&mut self, ctor: &ConstructorDecl) {
        self.symbols
            .enter_function(&format!("{}::constructor", ctor.class_name));

        for param in &ctor.parameters {
            self.define_parameter(&param.name, &param.param_type);
        }

        for initializer in &ctor.initializers {
            self.check_expression(&initializer.value);
        }

        if let Some(body) = &ctor.body {
            self.visit_block(body);
        }

        if let Err(e) = self.symbols.exit_function() {
            self.record(format!("Constructor error: {}", e));
        }
    }

    fn visit_destructor(&mut self, dtor: &DestructorDecl) {
        self.symbols
            .enter_function(&format!("{}::destructor", dtor.class_name));

        if let Some(body) = &dtor.body {
            self.visit_block(body);
        }

        if let Err(e) = self.symbols.exit_function() {
            self.record(format!("Destructor error: {}", e));
        }
    }

    fn visit_enum(&mut self, decl: &EnumDecl) {
        if let Err(e) = self.registry.register_type(&decl.name, TypeDefKind::Enum) {
            self.record(format!("Enum declaration error: {}", e));
        }
        if let Err(e) = self.symbols.define(
            &decl.name,
            SymbolKind::Enum,
            TypeNode::UserDefined {
                name: decl.name.clone(),
                is_const: false,
            },
            SymbolAttributes::default(),
        ) {
            self.record(format!("Enum declaration error: {}", e));
        }

        for enumerator in &decl.enumerators {
            let attributes = SymbolAttributes {
                is_const: true,
                ..SymbolAttributes::default()
            };
            if let Err(e) = self.symbols.define(
                &enumerator.name,
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                attributes,
            ) {
                self.record(format!("Enumerator error: {}", e));
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Visit a statement list inside a fresh anonymous block scope.
    fn visit_block(&mut self, statements: &[Statement]) {
        self.symbols.enter_scope("block");
        for statement in statements {
            self.visit_statement(statement);
        }
        if let Err(e) = self.symbols.exit_scope() {
            self.record(e);
        }
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Compound(statements) => self.visit_block(statements),
            Statement::Expression(expr) => {
                self.check_expression(expr);
            }
            Statement::Declaration(decl) => self.visit_declaration(decl),
            Statement::Return(value) => {
                let returned = value.as_ref().map(|expr| self.check_expression(expr));
                if let Err(e) = typecheck::check_return_type(
                    self.current_return_type.as_ref(),
                    returned.as_ref(),
                    &self.registry,
                ) {
                    self.record(e.to_string());
                }
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_expression(condition);
                self.visit_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_statement(else_branch);
                }
            }
            Statement::While { condition, body } => {
                let saved = self.in_loop;
                self.in_loop = true;
                self.check_expression(condition);
                self.visit_statement(body);
                self.in_loop = saved;
            }
            Statement::DoWhile { body, condition } => {
                let saved = self.in_loop;
                self.in_loop = true;
                self.visit_statement(body);
                self.check_expression(condition);
                self.in_loop = saved;
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
            } => {
                let saved = self.in_loop;
                self.in_loop = true;
                self.symbols.enter_scope("for");

                if let Some(init) = init {
                    self.visit_statement(init);
                }
                if let Some(condition) = condition {
                    self.check_expression(condition);
                }
                if let Some(increment) = increment {
                    self.check_expression(increment);
                }
                self.visit_statement(body);

                if let Err(e) = self.symbols.exit_scope() {
                    self.record(e);
                }
                self.in_loop = saved;
            }
            Statement::Break => {
                if !self.in_loop && !self.in_switch {
                    self.record("'break' statement not in loop or switch");
                }
            }
            Statement::Continue => {
                if !self.in_loop {
                    self.record("'continue' statement not in loop");
                }
            }
            Statement::Switch { condition, cases } => {
                let saved = self.in_switch;
                self.in_switch = true;
                self.check_expression(condition);

                for case in cases {
                    if let Some(value) = &case.value {
                        self.check_expression(value);
                    }
                    for statement in &case.body {
                        self.visit_statement(statement);
                    }
                }

                self.in_switch = saved;
            }
            Statement::Try { block, catches } => {
                self.visit_block(block);

                for clause in catches {
                    self.symbols.enter_scope("catch");
                    if let Some(name) = &clause.exception_name {
                        if let Err(e) = self.symbols.define(
                            name,
                            SymbolKind::Variable,
                            clause.exception_type.clone(),
                            SymbolAttributes::default(),
                        ) {
                            self.record(format!("Catch clause error: {}", e));
                        }
                    }
                    for statement in &clause.body {
                        self.visit_statement(statement);
                    }
                    if let Err(e) = self.symbols.exit_scope() {
                        self.record(e);
                    }
                }
            }
            Statement::Throw(expr) => {
                if let Some(expr) = expr {
                    self.check_expression(expr);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Check an expression, returning its type. Failures are recorded and
    /// analysis continues with an `int` placeholder.
    fn check_expression(&mut self, expr: &Expression) -> TypeNode {
        match expr {
            Expression::IntegerLit(_) => TypeNode::primitive("int"),
            Expression::FloatLit(_) => TypeNode::primitive("double"),
            Expression::CharLit(_) => TypeNode::primitive("char"),
            Expression::StringLit(_) => TypeNode::pointer_to(TypeNode::Primitive {
                name: "char".to_string(),
                is_signed: true,
                is_const: true,
                is_volatile: false,
            }),
            Expression::BoolLit(_) => TypeNode::primitive("bool"),
            Expression::NullptrLit => TypeNode::primitive("nullptr_t"),
            Expression::Identifier(name) => match self.symbols.lookup(name) {
                Some(symbol) => symbol.symbol_type.clone(),
                None => {
                    self.record(format!("Undefined identifier: '{}'", name));
                    Self::placeholder()
                }
            },
            Expression::Binary { left, op, right } => {
                let left_type = self.check_expression(left);
                let right_type = self.check_expression(right);
                match typecheck::binary_result_type(&left_type, op, &right_type, &self.registry) {
                    Ok(result) => result,
                    Err(e) => {
                        self.record(e.to_string());
                        Self::placeholder()
                    }
                }
            }
            Expression::Unary { op, operand, .. } => {
                let operand_type = self.check_expression(operand);
                match typecheck::unary_result_type(op, &operand_type) {
                    Ok(result) => result,
                    Err(e) => {
                        self.record(e.to_string());
                        Self::placeholder()
                    }
                }
            }
            Expression::Assignment { target, value, .. } => {
                let value_type = self.check_expression(value);
                let target_type = self.check_expression(target);
                if !typecheck::is_compatible(&value_type, &target_type, &self.registry) {
                    self.record(format!(
                        "Cannot assign value of type {} to target of type {}",
                        value_type, target_type
                    ));
                }
                target_type
            }
            Expression::Call {
                function,
                arguments,
            } => {
                let function_type = self.check_expression(function);
                for argument in arguments {
                    self.check_expression(argument);
                }
                // Overload resolution is name-only; the symbol's type is
                // the declared return type
                function_type
            }
            Expression::MemberAccess {
                object,
                member,
                arrow,
            } => {
                let object_type = self.check_expression(object);
                match typecheck::check_member_access(&object_type, member, *arrow, &self.registry)
                {
                    Ok(result) => result,
                    Err(e) => {
                        self.record(e.to_string());
                        Self::placeholder()
                    }
                }
            }
            Expression::ArrayAccess { array, index } => {
                let array_type = self.check_expression(array);
                let index_type = self.check_expression(index);
                match typecheck::check_array_access(&array_type, &index_type) {
                    Ok(result) => result,
                    Err(e) => {
                        self.record(e.to_string());
                        Self::placeholder()
                    }
                }
            }
            Expression::Ternary {
                condition,
                true_expr,
                false_expr,
            } => {
                self.check_expression(condition);
                let true_type = self.check_expression(true_expr);
                self.check_expression(false_expr);
                true_type
            }
            Expression::Cast {
                kind,
                target_type,
                expr,
            } => {
                let source_type = self.check_expression(expr);
                match typecheck::check_cast(&source_type, target_type, *kind) {
                    Ok(result) => result,
                    Err(e) => {
                        self.record(e.to_string());
                        Self::placeholder()
                    }
                }
            }
            Expression::New {
                allocated_type,
                arguments,
                array_size,
                ..
            } => {
                for argument in arguments {
                    self.check_expression(argument);
                }
                if let Some(size) = array_size {
                    self.check_expression(size);
                }
                TypeNode::pointer_to(allocated_type.clone())
            }
            Expression::Delete { expr, .. } => {
                self.check_expression(expr);
                TypeNode::primitive("void")
            }
            Expression::Sizeof(_) => TypeNode::primitive("int"),
            Expression::This => match self.symbols.current_class() {
                Some(class) => TypeNode::pointer_to(TypeNode::UserDefined {
                    name: class.to_string(),
                    is_const: false,
                }),
                None => {
                    self.record("'this' used outside of a class");
                    Self::placeholder()
                }
            },
            // Lambdas are parsed but not analyzed
            Expression::Lambda { .. } => Self::placeholder(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze(source: &str) -> (bool, SemanticAnalyzer) {
        let program = Parser::from_source(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::new();
        let success = analyzer.analyze(&program);
        (success, analyzer)
    }

    #[test]
    fn test_simple_function_passes() {
        let (success, analyzer) = analyze("int add(int a, int b) { return a + b; }");
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_scope_cursor_returns_to_global() {
        let (_, analyzer) = analyze(
            "int f(int n) { for (int i = 0; i < n; i++) { int x = i; } return 0; }",
        );
        assert!(analyzer.symbols.is_global_scope());
        assert_eq!(analyzer.symbols.scope_level(), 0);
    }

    #[test]
    fn test_undefined_identifier() {
        let (success, analyzer) = analyze("int main() { int x = 5; int y = z; return 0; }");
        assert!(!success);
        assert!(
            analyzer.errors.iter().any(|e| e.contains("z")),
            "expected an error mentioning 'z': {:?}",
            analyzer.errors
        );
    }

    #[test]
    fn test_break_outside_loop() {
        let (success, analyzer) = analyze("int main() { if (1) { break; } return 0; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("'break' statement not in loop or switch")),
            "errors: {:?}",
            analyzer.errors
        );
    }

    #[test]
    fn test_break_inside_loop_and_switch() {
        let (success, analyzer) = analyze(
            "int main() { while (1) { break; } switch (1) { case 1: break; } return 0; }",
        );
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_continue_outside_loop() {
        let (success, analyzer) = analyze("int main() { continue; return 0; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("'continue' statement not in loop"))
        );
    }

    #[test]
    fn test_continue_not_allowed_in_switch_alone() {
        let (success, _) = analyze("int main() { switch (1) { case 1: continue; } return 0; }");
        assert!(!success);
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let (success, analyzer) = analyze("int main() { int x = 1; int x = 2; return 0; }");
        assert!(!success);
        assert!(analyzer.errors.iter().any(|e| e.contains("Redefinition")));
    }

    #[test]
    fn test_shadowing_in_nested_block_allowed() {
        let (success, analyzer) =
            analyze("int main() { int x = 1; { int x = 2; } return x; }");
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_for_scope_is_private() {
        // The loop variable is confined to the for-scope; using it after
        // the loop is an error
        let (success, analyzer) = analyze(
            "int main() { for (int i = 0; i < 3; i++) { } return i; }",
        );
        assert!(!success);
        assert!(analyzer.errors.iter().any(|e| e.contains("'i'")));
    }

    #[test]
    fn test_void_function_cannot_return_value() {
        let (success, analyzer) = analyze("void f() { return 1; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("Void function cannot return a value"))
        );
    }

    #[test]
    fn test_non_void_function_must_return_value() {
        let (success, analyzer) = analyze("int f() { return; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("Non-void function must return a value"))
        );
    }

    #[test]
    fn test_incompatible_initializer() {
        let (success, analyzer) = analyze("class C { int x; };\nC c;\nint y = c;");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("Cannot initialize variable 'y'")),
            "errors: {:?}",
            analyzer.errors
        );
    }

    #[test]
    fn test_numeric_initializer_conversions_allowed() {
        let (success, analyzer) = analyze("int main() { double d = 1; int i = 2.5; return 0; }");
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_error_accumulation() {
        let (success, analyzer) = analyze(
            "int main() { int a = x; int b = y; break; return 0; }",
        );
        assert!(!success);
        assert!(
            analyzer.errors.len() >= 3,
            "expected at least 3 errors, got {:?}",
            analyzer.errors
        );
    }

    #[test]
    fn test_class_members_registered() {
        let (success, analyzer) = analyze(
            "class Point { public: int x; int y; int norm() { return x * x + y * y; } };",
        );
        assert!(success, "errors: {:?}", analyzer.errors);
        assert!(analyzer.registry.is_class("Point"));
        assert!(analyzer.registry.get_class_member("Point", "x").is_some());
        assert!(analyzer.registry.get_class_member("Point", "norm").is_some());
    }

    #[test]
    fn test_member_access_checked() {
        let (success, analyzer) = analyze(
            "class Point { public: int x; };\nPoint p;\nint f() { return p.y; }",
        );
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("has no member 'y'"))
        );
    }

    #[test]
    fn test_inherited_class_compatibility() {
        let (success, analyzer) = analyze(
            "class Base { int b; };\nclass Derived : public Base { int d; };\nDerived d;\nBase b = d;",
        );
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_function_overloads_accumulate() {
        let (success, analyzer) = analyze("int f(int a); int f(int a, int b); int f(double a);");
        assert!(success, "errors: {:?}", analyzer.errors);
        assert_eq!(analyzer.symbols.signatures("f").len(), 3);
    }

    #[test]
    fn test_namespace_qualified_overloads() {
        let (success, analyzer) = analyze("namespace math { int abs(int v) { return v; } }");
        assert!(success, "errors: {:?}", analyzer.errors);
        assert_eq!(analyzer.symbols.signatures("math::abs").len(), 1);
    }

    #[test]
    fn test_enum_defines_enumerators() {
        let (success, analyzer) =
            analyze("enum Color { Red, Green };\nint f() { return Red; }");
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_catch_binds_exception_variable() {
        let (success, analyzer) = analyze(
            "int f() { try { throw 1; } catch (int e) { return e; } return 0; }",
        );
        assert!(success, "errors: {:?}", analyzer.errors);
    }

    #[test]
    fn test_this_outside_class() {
        let (success, analyzer) = analyze("int f() { return this->x; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("'this' used outside of a class"))
        );
    }

    #[test]
    fn test_constructor_and_destructor_scopes() {
        let (success, analyzer) = analyze(
            "class C { public: int v; C(int x) : v(x) { int t = x; } ~C() { } };",
        );
        assert!(success, "errors: {:?}", analyzer.errors);
        assert!(analyzer.symbols.is_global_scope());
    }

    #[test]
    fn test_bitwise_on_double_rejected() {
        let (success, analyzer) = analyze("int f(double d) { return d & 1; }");
        assert!(!success);
        assert!(
            analyzer
                .errors
                .iter()
                .any(|e| e.contains("Bitwise operator '&' requires integral operands"))
        );
    }

    #[test]
    fn test_parameters_visible_in_body() {
        let (success, analyzer) = analyze("int twice(int n) { int m = n * 2; return m; }");
        assert!(success, "errors: {:?}", analyzer.errors);
    }
}
