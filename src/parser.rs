//! Recursive descent parser: token stream to AST
//!
//! Declarations and statements are dispatched on the leading token;
//! expressions use precedence climbing, one method per level, from
//! assignment (lowest, right-associative) down to primary. The parser does
//! not attempt recovery: the first mismatch aborts with a [`ParserError`]
//! carrying the offending token's position.
//!
//! Preprocessor tokens are skipped at the top level; the grammar itself
//! never sees them.

use crate::ast::{
    Access, CastKind, CatchClause, ClassDecl, ConstructorDecl, Declaration, DestructorDecl,
    EnumDecl, Enumerator, Expression, FunctionDecl, MemberInitializer, NamespaceDecl, Parameter,
    Program, Statement, SwitchCase, TemplateDecl, TemplateParameter, TypeNode, TypedefDecl,
    UsingDecl, VariableDecl,
};
use crate::token::{Token, TokenKind};
use thiserror::Error;

/// Error raised for syntax failures. Carries the position of the token
/// the parser was looking at when it gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parser error at {line}:{column}: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

const TYPE_START: &[TokenKind] = &[
    TokenKind::Int,
    TokenKind::Float,
    TokenKind::Double,
    TokenKind::Char,
    TokenKind::Bool,
    TokenKind::Void,
    TokenKind::Short,
    TokenKind::Long,
    TokenKind::Signed,
    TokenKind::Unsigned,
    TokenKind::Const,
    TokenKind::Volatile,
    TokenKind::Auto,
];

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        // The grammar relies on a trailing Eof; guarantee one even for a
        // hand-constructed token list
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column))
                .unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Parser {
            tokens,
            position: 0,
        }
    }

    /// Lex and parse a source string in one step.
    pub fn from_source(source: &str) -> Result<Self, crate::lexer::LexerError> {
        Ok(Parser::new(crate::lexer::tokenize(source)?))
    }

    fn current(&self) -> &Token {
        let index = self.position.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn match_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current().kind)
    }

    fn match_and_consume(&mut self, kinds: &[TokenKind]) -> Option<Token> {
        if self.match_any(kinds) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParserError> {
        if self.current().kind != kind {
            return self.error(format!(
                "Expected {:?}, got {:?}",
                kind,
                self.current().kind
            ));
        }
        Ok(self.advance())
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParserError> {
        let token = self.current();
        Err(ParserError {
            message: message.into(),
            line: token.line,
            column: token.column,
        })
    }

    /// Parse the entire program.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut program = Program::new();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Preprocessor) {
                self.advance();
                continue;
            }
            if let Some(decl) = self.parse_declaration()? {
                program.declarations.push(decl);
            }
        }
        Ok(program)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_declaration(&mut self) -> Result<Option<Declaration>, ParserError> {
        match self.current().kind {
            TokenKind::Namespace => Ok(Some(self.parse_namespace()?)),
            TokenKind::Using => Ok(Some(self.parse_using()?)),
            TokenKind::Template => Ok(Some(self.parse_template()?)),
            TokenKind::Class | TokenKind::Struct => Ok(Some(self.parse_class()?)),
            TokenKind::Enum => Ok(Some(self.parse_enum()?)),
            TokenKind::Typedef => Ok(Some(self.parse_typedef()?)),
            _ => self.parse_function_or_variable(),
        }
    }

    fn parse_namespace(&mut self) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Namespace)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::LBrace)?;

        let mut declarations = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if let Some(decl) = self.parse_declaration()? {
                declarations.push(decl);
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Declaration::Namespace(NamespaceDecl { name, declarations }))
    }

    fn parse_using(&mut self) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Using)?;

        // 'using namespace X;' - the namespace keyword is absorbed
        if self.check(TokenKind::Namespace) {
            self.advance();
        }

        let mut parts = vec![self.expect(TokenKind::Identifier)?.lexeme];
        while self.check(TokenKind::Scope) {
            self.advance();
            parts.push(self.expect(TokenKind::Identifier)?.lexeme);
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(Declaration::Using(UsingDecl {
            name: parts.join("::"),
        }))
    }

    fn parse_template(&mut self) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Template)?;
        self.expect(TokenKind::LessThan)?;

        let mut parameters = Vec::new();
        while !self.check(TokenKind::GreaterThan) {
            // 'typename' or 'class'
            let kind = self.advance().lexeme;
            let name = self.expect(TokenKind::Identifier)?.lexeme;

            let default_type = if self.check(TokenKind::Assign) {
                self.advance();
                Some(self.parse_type()?)
            } else {
                None
            };

            parameters.push(TemplateParameter {
                kind,
                name,
                default_type,
            });

            if !self.check(TokenKind::GreaterThan) {
                self.expect(TokenKind::Comma)?;
            }
        }

        self.expect(TokenKind::GreaterThan)?;

        let declaration = match self.parse_declaration()? {
            Some(decl) => decl,
            None => return self.error("Expected declaration after template parameter list"),
        };

        Ok(Declaration::Template(TemplateDecl {
            parameters,
            declaration: Box::new(declaration),
        }))
    }

    fn parse_class(&mut self) -> Result<Declaration, ParserError> {
        let is_struct = self.current().kind == TokenKind::Struct;
        self.advance();

        let name = self.expect(TokenKind::Identifier)?.lexeme;

        // Base class list
        let mut base_classes = Vec::new();
        if self.check(TokenKind::Colon) {
            self.advance();
            loop {
                // Access specifiers on bases are accepted and ignored
                self.match_and_consume(&[
                    TokenKind::Public,
                    TokenKind::Private,
                    TokenKind::Protected,
                ]);
                base_classes.push(self.expect(TokenKind::Identifier)?.lexeme);

                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.expect(TokenKind::LBrace)?;

        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            // Access specifier
            if let Some(token) = self.match_and_consume(&[
                TokenKind::Public,
                TokenKind::Private,
                TokenKind::Protected,
            ]) {
                self.expect(TokenKind::Colon)?;
                let access = match token.kind {
                    TokenKind::Public => Access::Public,
                    TokenKind::Protected => Access::Protected,
                    _ => Access::Private,
                };
                members.push(Declaration::AccessSpecifier(access));
                continue;
            }

            // Constructor: leading identifier equal to the class name
            if self.check(TokenKind::Identifier) && self.current().lexeme == name {
                members.push(self.parse_constructor(&name)?);
                continue;
            }

            // Destructor, with optional leading 'virtual'
            let virtual_dtor =
                self.check(TokenKind::Virtual) && self.peek(1).is_some_and(|t| t.kind == TokenKind::BitwiseNot);
            if virtual_dtor || self.check(TokenKind::BitwiseNot) {
                if virtual_dtor {
                    self.advance();
                }
                self.advance(); // ~
                if self.check(TokenKind::Identifier) && self.current().lexeme == name {
                    members.push(self.parse_destructor(&name, virtual_dtor)?);
                    continue;
                }
                return self.error(format!("Expected destructor name '{}' after '~'", name));
            }

            // Regular member
            if let Some(member) = self.parse_function_or_variable()? {
                members.push(member);
            }
        }

        self.expect(TokenKind::RBrace)?;
        self.match_and_consume(&[TokenKind::Semicolon]);

        Ok(Declaration::Class(ClassDecl {
            name,
            base_classes,
            members,
            is_struct,
        }))
    }

    fn parse_constructor(&mut self, class_name: &str) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Identifier)?; // class name
        self.expect(TokenKind::LParen)?;
        let parameters = self.parse_parameter_list()?;
        self.expect(TokenKind::RParen)?;

        // Member initializer list
        let mut initializers = Vec::new();
        if self.check(TokenKind::Colon) {
            self.advance();
            loop {
                let member = self.expect(TokenKind::Identifier)?.lexeme;
                self.expect(TokenKind::LParen)?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;

                initializers.push(MemberInitializer { member, value });

                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        let body = if self.check(TokenKind::LBrace) {
            Some(self.parse_compound()?)
        } else {
            self.expect(TokenKind::Semicolon)?;
            None
        };

        Ok(Declaration::Constructor(ConstructorDecl {
            class_name: class_name.to_string(),
            parameters,
            initializers,
            body,
        }))
    }

    fn parse_destructor(
        &mut self,
        class_name: &str,
        is_virtual: bool,
    ) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Identifier)?; // class name
        self.expect(TokenKind::LParen)?;
        self.expect(TokenKind::RParen)?;

        let body = if self.check(TokenKind::LBrace) {
            Some(self.parse_compound()?)
        } else {
            self.expect(TokenKind::Semicolon)?;
            None
        };

        Ok(Declaration::Destructor(DestructorDecl {
            class_name: class_name.to_string(),
            body,
            is_virtual,
        }))
    }

    fn parse_enum(&mut self) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Enum)?;

        // Optional 'class' / 'struct' for scoped enums
        self.match_and_consume(&[TokenKind::Class, TokenKind::Struct]);

        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::LBrace)?;

        let mut enumerators = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let enum_name = self.expect(TokenKind::Identifier)?.lexeme;
            let value = if self.check(TokenKind::Assign) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };

            enumerators.push(Enumerator {
                name: enum_name,
                value,
            });

            if !self.check(TokenKind::RBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }

        self.expect(TokenKind::RBrace)?;
        self.match_and_consume(&[TokenKind::Semicolon]);

        Ok(Declaration::Enum(EnumDecl { name, enumerators }))
    }

    fn parse_typedef(&mut self) -> Result<Declaration, ParserError> {
        self.expect(TokenKind::Typedef)?;
        let original_type = self.parse_type()?;
        let new_name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::Semicolon)?;
        Ok(Declaration::Typedef(TypedefDecl {
            original_type,
            new_name,
        }))
    }

    /// Parse a function or variable declaration. Returns `None` when no
    /// identifier follows the type (e.g. a stray `int;`).
    fn parse_function_or_variable(&mut self) -> Result<Option<Declaration>, ParserError> {
        let is_static = self.match_and_consume(&[TokenKind::Static]).is_some();
        let is_extern = self.match_and_consume(&[TokenKind::Extern]).is_some();
        let is_inline = self.match_and_consume(&[TokenKind::Inline]).is_some();
        let is_virtual = self.match_and_consume(&[TokenKind::Virtual]).is_some();
        let is_constexpr = self.match_and_consume(&[TokenKind::Constexpr]).is_some();

        let ty = self.parse_type()?;

        if !self.check(TokenKind::Identifier) {
            return Ok(None);
        }
        let name = self.advance().lexeme;

        // Function?
        if self.check(TokenKind::LParen) {
            self.advance();
            let parameters = self.parse_parameter_list()?;
            self.expect(TokenKind::RParen)?;

            let is_const = self.match_and_consume(&[TokenKind::Const]).is_some();
            let is_override = self.match_and_consume(&[TokenKind::Override]).is_some();
            self.match_and_consume(&[TokenKind::Final]);

            let body = if self.check(TokenKind::LBrace) {
                Some(self.parse_compound()?)
            } else {
                self.expect(TokenKind::Semicolon)?;
                None
            };

            return Ok(Some(Declaration::Function(FunctionDecl {
                return_type: ty,
                name,
                parameters,
                body,
                is_inline,
                is_static,
                is_virtual,
                is_override,
                is_const,
            })));
        }

        // Variable
        let initializer = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon)?;

        Ok(Some(Declaration::Variable(VariableDecl {
            var_type: ty,
            name,
            initializer,
            is_static,
            is_extern,
            is_constexpr,
        })))
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<Parameter>, ParserError> {
        let mut params = Vec::new();

        if self.check(TokenKind::RParen) {
            return Ok(params);
        }

        loop {
            let param_type = self.parse_type()?;
            let name = if self.check(TokenKind::Identifier) {
                self.advance().lexeme
            } else {
                String::new()
            };

            let default_value = if self.check(TokenKind::Assign) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };

            params.push(Parameter {
                param_type,
                name,
                default_value,
            });

            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(params)
    }

    fn parse_type(&mut self) -> Result<TypeNode, ParserError> {
        let is_const = self.match_and_consume(&[TokenKind::Const]).is_some();
        let is_volatile = self.match_and_consume(&[TokenKind::Volatile]).is_some();
        let mut is_signed = true;

        if self.check(TokenKind::Unsigned) {
            self.advance();
            is_signed = false;
        } else if self.check(TokenKind::Signed) {
            self.advance();
        }

        let mut base = if self.match_any(&[
            TokenKind::Int,
            TokenKind::Char,
            TokenKind::Float,
            TokenKind::Double,
            TokenKind::Void,
            TokenKind::Bool,
            TokenKind::Short,
            TokenKind::Long,
        ]) {
            let mut name = self.advance().lexeme;

            // 'long long' collapses to a single primitive
            if name == "long" && self.check(TokenKind::Long) {
                self.advance();
                name = "long long".to_string();
            }

            TypeNode::Primitive {
                name,
                is_signed,
                is_const,
                is_volatile,
            }
        } else if self.check(TokenKind::Auto) {
            self.advance();
            TypeNode::Primitive {
                name: "auto".to_string(),
                is_signed: true,
                is_const,
                is_volatile,
            }
        } else if self.check(TokenKind::Identifier) {
            let name = self.advance().lexeme;
            TypeNode::UserDefined { name, is_const }
        } else {
            return self.error(format!("Expected type, got {:?}", self.current().kind));
        };

        // Pointer and reference suffixes
        while self.match_any(&[TokenKind::Multiply, TokenKind::BitwiseAnd]) {
            if self.current().kind == TokenKind::Multiply {
                self.advance();
                let ptr_const = self.match_and_consume(&[TokenKind::Const]).is_some();
                base = TypeNode::Pointer {
                    base: Box::new(base),
                    is_const: ptr_const,
                };
            } else {
                self.advance();
                base = TypeNode::Reference {
                    base: Box::new(base),
                };
            }
        }

        Ok(base)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.current().kind {
            TokenKind::LBrace => Ok(Statement::Compound(self.parse_compound()?)),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Continue)
            }
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            _ if self.is_type_start() => {
                // Local declaration in statement position
                match self.parse_function_or_variable()? {
                    Some(decl) => Ok(Statement::Declaration(Box::new(decl))),
                    None => self.error("Expected identifier in declaration"),
                }
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn is_type_start(&self) -> bool {
        self.match_any(TYPE_START)
    }

    fn parse_compound(&mut self) -> Result<Vec<Statement>, ParserError> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }

        self.expect(TokenKind::RBrace)?;
        Ok(statements)
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::Return)?;

        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Return(value))
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;

        let then_branch = Box::new(self.parse_statement()?);

        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { condition, body })
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::DoWhile { body, condition })
    }

    fn parse_for_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        // Init clause: a full statement (declaration or expression), which
        // consumes its own terminating semicolon
        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let increment = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For {
            init,
            condition,
            increment,
            body,
        })
    }

    fn parse_switch_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Case) {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;

                let mut body = Vec::new();
                while !self.match_any(&[TokenKind::Case, TokenKind::Default, TokenKind::RBrace]) {
                    body.push(self.parse_statement()?);
                }

                cases.push(SwitchCase {
                    value: Some(value),
                    body,
                });
            } else if self.check(TokenKind::Default) {
                self.advance();
                self.expect(TokenKind::Colon)?;

                let mut body = Vec::new();
                while !self.match_any(&[TokenKind::Case, TokenKind::Default, TokenKind::RBrace]) {
                    body.push(self.parse_statement()?);
                }

                cases.push(SwitchCase { value: None, body });
            } else {
                return self.error("Expected 'case' or 'default' in switch body");
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Statement::Switch { condition, cases })
    }

    fn parse_try_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::Try)?;
        let block = self.parse_compound()?;

        let mut catches = Vec::new();
        while self.check(TokenKind::Catch) {
            self.advance();
            self.expect(TokenKind::LParen)?;

            let exception_type = self.parse_type()?;
            let exception_name = if self.check(TokenKind::Identifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };

            self.expect(TokenKind::RParen)?;
            let body = self.parse_compound()?;

            catches.push(CatchClause {
                exception_type,
                exception_name,
                body,
            });
        }

        Ok(Statement::Try { block, catches })
    }

    fn parse_throw_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::Throw)?;

        let expr = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Throw(expr))
    }

    // ------------------------------------------------------------------
    // Expressions (precedence climbing, lowest level first)
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression, ParserError> {
        let expr = self.parse_ternary()?;

        if let Some(token) = self.match_and_consume(&[
            TokenKind::Assign,
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::MultiplyAssign,
            TokenKind::DivideAssign,
            TokenKind::ModuloAssign,
        ]) {
            // Right-associative
            let value = self.parse_assignment()?;
            return Ok(Expression::Assignment {
                target: Box::new(expr),
                op: token.lexeme,
                value: Box::new(value),
            });
        }

        Ok(expr)
    }

    fn parse_ternary(&mut self) -> Result<Expression, ParserError> {
        let expr = self.parse_logical_or()?;

        if self.check(TokenKind::Question) {
            self.advance();
            // The middle expression parses a full expression; the tail is
            // right-associative
            let true_expr = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let false_expr = self.parse_ternary()?;
            return Ok(Expression::Ternary {
                condition: Box::new(expr),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            });
        }

        Ok(expr)
    }

    fn parse_binary_level(
        &mut self,
        kinds: &[TokenKind],
        next: fn(&mut Self) -> Result<Expression, ParserError>,
    ) -> Result<Expression, ParserError> {
        let mut left = next(self)?;

        while self.match_any(kinds) {
            let op = self.advance().lexeme;
            let right = next(self)?;
            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::LogicalOr], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::LogicalAnd], Self::parse_bitwise_or)
    }

    fn parse_bitwise_or(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::BitwiseOr], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::BitwiseXor], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::BitwiseAnd], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(
            &[TokenKind::Equal, TokenKind::NotEqual],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(
            &[
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Spaceship,
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(
            &[TokenKind::LeftShift, TokenKind::RightShift],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParserError> {
        self.parse_binary_level(
            &[TokenKind::Multiply, TokenKind::Divide, TokenKind::Modulo],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expression, ParserError> {
        // Prefix operators, right-associative
        if let Some(token) = self.match_and_consume(&[
            TokenKind::Increment,
            TokenKind::Decrement,
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::LogicalNot,
            TokenKind::BitwiseNot,
        ]) {
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op: token.lexeme,
                operand: Box::new(operand),
                is_postfix: false,
            });
        }

        if self.match_any(&[
            TokenKind::StaticCast,
            TokenKind::DynamicCast,
            TokenKind::ConstCast,
            TokenKind::ReinterpretCast,
        ]) {
            return self.parse_cast();
        }

        if self.check(TokenKind::Sizeof) {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let operand = self.parse_type()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expression::Sizeof(operand));
        }

        if self.check(TokenKind::New) {
            return self.parse_new();
        }

        if self.check(TokenKind::Delete) {
            return self.parse_delete();
        }

        self.parse_postfix()
    }

    fn parse_cast(&mut self) -> Result<Expression, ParserError> {
        let kind = match self.advance().kind {
            TokenKind::StaticCast => CastKind::Static,
            TokenKind::DynamicCast => CastKind::Dynamic,
            TokenKind::ConstCast => CastKind::Const,
            _ => CastKind::Reinterpret,
        };
        self.expect(TokenKind::LessThan)?;
        let target_type = self.parse_type()?;
        self.expect(TokenKind::GreaterThan)?;
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expression::Cast {
            kind,
            target_type,
            expr: Box::new(expr),
        })
    }

    fn parse_new(&mut self) -> Result<Expression, ParserError> {
        self.expect(TokenKind::New)?;

        let mut is_array = false;
        let mut array_size = None;

        if self.check(TokenKind::LBracket) {
            is_array = true;
            self.advance();
            if !self.check(TokenKind::RBracket) {
                array_size = Some(Box::new(self.parse_expression()?));
            }
            self.expect(TokenKind::RBracket)?;
        }

        let allocated_type = self.parse_type()?;

        // Constructor arguments
        let mut arguments = Vec::new();
        if self.check(TokenKind::LParen) {
            self.advance();
            if !self.check(TokenKind::RParen) {
                arguments.push(self.parse_expression()?);
                while self.check(TokenKind::Comma) {
                    self.advance();
                    arguments.push(self.parse_expression()?);
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        Ok(Expression::New {
            allocated_type,
            arguments,
            is_array,
            array_size,
        })
    }

    fn parse_delete(&mut self) -> Result<Expression, ParserError> {
        self.expect(TokenKind::Delete)?;

        let mut is_array = false;
        if self.check(TokenKind::LBracket) {
            is_array = true;
            self.advance();
            self.expect(TokenKind::RBracket)?;
        }

        let expr = self.parse_unary()?;
        Ok(Expression::Delete {
            expr: Box::new(expr),
            is_array,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParserError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current().kind {
                TokenKind::Increment | TokenKind::Decrement => {
                    let op = self.advance().lexeme;
                    expr = Expression::Unary {
                        op,
                        operand: Box::new(expr),
                        is_postfix: true,
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut arguments = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        arguments.push(self.parse_expression()?);
                        while self.check(TokenKind::Comma) {
                            self.advance();
                            arguments.push(self.parse_expression()?);
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expression::Call {
                        function: Box::new(expr),
                        arguments,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expression::ArrayAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect(TokenKind::Identifier)?.lexeme;
                    expr = Expression::MemberAccess {
                        object: Box::new(expr),
                        member,
                        arrow: false,
                    };
                }
                TokenKind::Arrow => {
                    self.advance();
                    let member = self.expect(TokenKind::Identifier)?.lexeme;
                    expr = Expression::MemberAccess {
                        object: Box::new(expr),
                        member,
                        arrow: true,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        match self.current().kind {
            TokenKind::Integer => {
                let token = self.advance();
                match parse_integer_lexeme(&token.lexeme) {
                    Some(value) => Ok(Expression::IntegerLit(value)),
                    None => Err(ParserError {
                        message: format!("Invalid integer literal '{}'", token.lexeme),
                        line: token.line,
                        column: token.column,
                    }),
                }
            }
            TokenKind::FloatLiteral => {
                let token = self.advance();
                let stripped = token.lexeme.trim_end_matches(|c| "fFlL".contains(c));
                match stripped.parse::<f64>() {
                    Ok(value) => Ok(Expression::FloatLit(value)),
                    Err(_) => Err(ParserError {
                        message: format!("Invalid float literal '{}'", token.lexeme),
                        line: token.line,
                        column: token.column,
                    }),
                }
            }
            TokenKind::CharLiteral => {
                let token = self.advance();
                Ok(Expression::CharLit(decode_char_literal(&token.lexeme)))
            }
            TokenKind::StringLiteral => {
                let token = self.advance();
                let inner = token
                    .lexeme
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(&token.lexeme);
                Ok(Expression::StringLit(unescape(inner)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::BoolLit(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::BoolLit(false))
            }
            TokenKind::Nullptr => {
                self.advance();
                Ok(Expression::NullptrLit)
            }
            TokenKind::This => {
                self.advance();
                Ok(Expression::This)
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Ok(Expression::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            other => self.error(format!("Unexpected token in expression: {:?}", other)),
        }
    }
}

/// Parse an integer literal lexeme, handling hex/binary/octal prefixes and
/// stripping type suffixes. Digit separators were removed by the lexer.
fn parse_integer_lexeme(lexeme: &str) -> Option<i64> {
    let digits = lexeme.trim_end_matches(|c| "uUlL".contains(c));
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

/// Decode a quoted character literal lexeme into its character value.
fn decode_char_literal(lexeme: &str) -> char {
    let inner = lexeme
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(lexeme);
    let mut chars = inner.chars();
    match chars.next() {
        Some('\\') => escape_value(chars.next().unwrap_or('\\')),
        Some(c) => c,
        None => '\0',
    }
}

/// Process escape sequences in a string literal body.
fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => result.push(escape_value(escaped)),
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

fn escape_value(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        // Unknown escapes resolve to the character itself ('\\', '\'', '"')
        other => other,
    }
}
