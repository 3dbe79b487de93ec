//! cxc compiler CLI
//!
//! Command-line interface for compiling C++-like source files to the
//! textual three-address IR, with switches for dumping each intermediate
//! artifact.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use cxc::{CompilationStats, Compiler, CompilerConfig, DumpOptions, OptimizationLevel};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "cxc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "cxc compiler - compile C++-like sources to three-address IR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to textual IR
    Build {
        /// Input source file
        input: PathBuf,

        /// Output IR path (defaults to the input with an .ir extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optimization level (0-3)
        #[arg(short = 'O', long = "optimize", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=3))]
        optimize: u8,

        /// Target identifier passed through to a back-end
        #[arg(long)]
        target: Option<String>,

        /// Compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print compilation phases as they run
        #[arg(long)]
        debug: bool,

        /// Display the token stream
        #[arg(long)]
        show_tokens: bool,

        /// Display an AST summary
        #[arg(long)]
        show_ast: bool,

        /// Display the IR before optimization
        #[arg(long)]
        show_ir: bool,

        /// Display the IR after optimization
        #[arg(long)]
        show_optimized_ir: bool,

        /// Show compilation statistics
        #[arg(long)]
        stats: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            optimize,
            target,
            config,
            debug,
            show_tokens,
            show_ast,
            show_ir,
            show_optimized_ir,
            stats,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("ir"));

            // Start from the config file when given, then apply CLI flags
            let mut compiler_config = match config {
                Some(path) => match CompilerConfig::load_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(1);
                    }
                },
                None => CompilerConfig::default(),
            };

            match OptimizationLevel::try_from(optimize) {
                Ok(level) => compiler_config.optimization_level = level,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
            if let Some(target) = target {
                compiler_config.target = target;
            }
            compiler_config.debug = compiler_config.debug || debug;
            compiler_config.dump = DumpOptions {
                tokens: compiler_config.dump.tokens || show_tokens,
                ast: compiler_config.dump.ast || show_ast,
                ir: compiler_config.dump.ir || show_ir,
                optimized_ir: compiler_config.dump.optimized_ir || show_optimized_ir,
                stats: compiler_config.dump.stats || stats,
            };

            run_build(&input, &output, compiler_config);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cxc", &mut io::stdout());
        }
    }
}

fn run_build(input: &Path, output: &Path, config: CompilerConfig) {
    let source = match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", input.display(), e);
            process::exit(1);
        }
    };

    let dump = config.dump;
    let target = config.target.clone();
    let level = config.optimization_level;
    let mut compiler = Compiler::new(config);

    if let Err(e) = compiler.compile(&source, &input.to_string_lossy()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if dump.tokens
        && let Some(tokens) = compiler.tokens()
    {
        print_section("TOKENS");
        for (i, token) in tokens.iter().enumerate() {
            if token.kind != cxc::TokenKind::Eof {
                println!("{:4}. {}", i + 1, token);
            }
        }
    }

    if dump.ast
        && let Some(ast) = compiler.ast()
    {
        print_section("ABSTRACT SYNTAX TREE");
        println!("AST with {} top-level declarations", ast.declarations.len());
    }

    if dump.ir
        && let Some(ir) = compiler.ir()
    {
        print_section("INTERMEDIATE REPRESENTATION");
        print!("{}", ir);
    }

    if dump.optimized_ir
        && let Some(ir) = compiler.optimized_ir()
    {
        print_section("OPTIMIZED INTERMEDIATE REPRESENTATION");
        print!("{}", ir);
    }

    if dump.stats {
        print_stats(compiler.stats(), level, &target);
    }

    let ir_text = compiler
        .optimized_ir()
        .map(|ir| ir.to_string())
        .unwrap_or_default();
    if let Err(e) = std::fs::write(output, ir_text) {
        eprintln!("Error: failed to write '{}': {}", output.display(), e);
        process::exit(1);
    }

    println!("Compiled {} -> {}", input.display(), output.display());
}

fn print_section(title: &str) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{}", title);
    println!("{}", "=".repeat(60));
}

fn print_stats(stats: CompilationStats, level: OptimizationLevel, target: &str) {
    print_section("COMPILATION STATISTICS");
    println!("Tokens:           {}", stats.tokens);
    println!("AST nodes:        {}", stats.ast_nodes);
    println!("IR instructions:  {}", stats.ir_instructions);
    println!("Optimization:     Level {}", level.level());
    println!("Target:           {}", target);
}
