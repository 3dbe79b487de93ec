//! cxc compiler library
//!
//! Front-end and mid-end for a C++-like source language: lexing, recursive
//! descent parsing, semantic analysis with scoped symbol tables, and
//! generation of an optimized machine-independent three-address IR ready
//! for a back-end to lower.
//!
//! The pipeline runs as one synchronous call per translation unit:
//!
//! ```rust
//! use cxc::{Compiler, CompilerConfig};
//!
//! let mut compiler = Compiler::new(CompilerConfig::default());
//! let ir = compiler
//!     .compile("int add(int a, int b) { return a + b; }", "<stdin>")
//!     .unwrap();
//! assert!(ir.to_string().contains("function add(a, b):"));
//! ```
//!
//! Each compilation owns all of its state; distinct compilations are
//! independent and may run in parallel.

pub mod analyzer;
pub mod ast;
pub mod config;
pub mod error;
pub mod ir;
pub mod irgen;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod symbols;
pub mod token;
pub mod typecheck;

pub use analyzer::SemanticAnalyzer;
pub use ast::Program;
pub use config::{CompilerConfig, DumpOptions, OptimizationLevel};
pub use error::CompilerError;
pub use ir::IrProgram;
pub use irgen::{IrGenerator, generate_ir};
pub use lexer::{Lexer, LexerError};
pub use optimizer::optimize_ir;
pub use parser::{Parser, ParserError};
pub use symbols::{SymbolTable, TypeRegistry};
pub use token::{Token, TokenKind};

/// Counters gathered while compiling, for `--stats` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilationStats {
    pub tokens: usize,
    pub ast_nodes: usize,
    pub ir_instructions: usize,
}

/// Drives one compilation and retains the intermediate artifacts so the
/// caller can dump tokens, the AST, or either IR form afterwards.
pub struct Compiler {
    config: CompilerConfig,
    tokens: Option<Vec<Token>>,
    ast: Option<Program>,
    ir: Option<IrProgram>,
    optimized_ir: Option<IrProgram>,
    stats: CompilationStats,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler {
            config,
            tokens: None,
            ast: None,
            ir: None,
            optimized_ir: None,
            stats: CompilationStats::default(),
        }
    }

    /// Compile source text through every phase, returning the optimized IR.
    pub fn compile(
        &mut self,
        source: &str,
        filename: &str,
    ) -> Result<&IrProgram, CompilerError> {
        if self.config.debug {
            println!("Compiling {} (-{})", filename, self.config.optimization_level);
            println!("Phase 1: Lexical analysis...");
        }
        let tokens = lexer::tokenize(source)?;
        self.stats.tokens = tokens.len();

        if self.config.debug {
            println!("Phase 2: Syntax analysis...");
        }
        let ast = Parser::new(tokens.clone()).parse()?;
        self.tokens = Some(tokens);
        self.stats.ast_nodes = ast.declarations.len();

        if self.config.debug {
            println!("Phase 3: Semantic analysis...");
        }
        let mut analyzer = SemanticAnalyzer::new();
        if !analyzer.analyze(&ast) {
            return Err(CompilerError::Semantic {
                errors: analyzer.errors,
            });
        }

        if self.config.debug {
            println!("Phase 4: IR generation...");
        }
        let ir = generate_ir(&ast)?;
        self.ast = Some(ast);
        self.stats.ir_instructions = ir.instruction_count();

        if self.config.debug {
            println!(
                "Phase 5: Optimization (level {})...",
                self.config.optimization_level.level()
            );
        }
        let optimized = optimize_ir(ir.clone(), self.config.optimization_level);
        self.ir = Some(ir);
        self.stats.ir_instructions = optimized.instruction_count();

        Ok(self.optimized_ir.insert(optimized))
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Token list from the last compilation.
    pub fn tokens(&self) -> Option<&[Token]> {
        self.tokens.as_deref()
    }

    /// AST from the last compilation.
    pub fn ast(&self) -> Option<&Program> {
        self.ast.as_ref()
    }

    /// Unoptimized IR from the last compilation.
    pub fn ir(&self) -> Option<&IrProgram> {
        self.ir.as_ref()
    }

    /// Optimized IR from the last compilation.
    pub fn optimized_ir(&self) -> Option<&IrProgram> {
        self.optimized_ir.as_ref()
    }

    pub fn stats(&self) -> CompilationStats {
        self.stats
    }
}

/// Compile a source string at the given optimization level.
pub fn compile_source(
    source: &str,
    level: OptimizationLevel,
) -> Result<IrProgram, CompilerError> {
    let mut compiler = Compiler::new(CompilerConfig::new().with_optimization_level(level));
    compiler.compile(source, "<stdin>")?;
    Ok(compiler
        .optimized_ir
        .take()
        .unwrap_or_default())
}
