//! Callme Compiler CLI
//!
//! Command-line interface for compiling `.cm` programs to assembly or
//! executables.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "callmec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Callme compiler - compile .cm programs to x86-64 executables", long_about = None)]
struct Cli {
    /// Driver configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .cm file to an executable
    Build {
        /// Input .cm source file
        input: PathBuf,

        /// Output executable path (defaults to input filename without .cm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the intermediate assembly file (.asm)
        #[arg(long)]
        keep_asm: bool,
    },

    /// Compile a .cm file to assembly only
    Emit {
        /// Input .cm source file
        input: PathBuf,

        /// Output assembly path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse and compile without writing any output
    Check {
        /// Input .cm source file
        input: PathBuf,
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
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Build {
            input,
            output,
            keep_asm,
        } => {
            let output = output.unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                PathBuf::from(stem)
            });
            let mut config = config;
            config.keep_asm = config.keep_asm || keep_asm;
            run_build(&input, &output, &config);
        }
        Commands::Emit { input, output } => {
            run_emit(&input, output.as_deref());
        }
        Commands::Check { input } => {
            run_check(&input);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "callmec", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>) -> callmec::CompilerConfig {
    let Some(path) = path else {
        return callmec::CompilerConfig::default();
    };
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading config {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match callmec::CompilerConfig::from_toml(&content) {
        Ok(user_config) => {
            let mut config = callmec::CompilerConfig::default();
            config.merge(user_config);
            config
        }
        Err(e) => {
            eprintln!("Error parsing config {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_build(input: &Path, output: &Path, config: &callmec::CompilerConfig) {
    match callmec::compile_file_with_config(input, output, config) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output.display());
            if config.keep_asm {
                let asm_path = output.with_extension("asm");
                if asm_path.exists() {
                    println!("Assembly saved to {}", asm_path.display());
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_emit(input: &Path, output: Option<&Path>) {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    let asm = match callmec::compile_to_asm(&source) {
        Ok(asm) => asm,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, asm) {
                eprintln!("Error writing {}: {}", path.display(), e);
                process::exit(1);
            }
        }
        None => {
            if let Err(e) = io::stdout().write_all(asm.as_bytes()) {
                eprintln!("Error writing to stdout: {}", e);
                process::exit(1);
            }
        }
    }
}

fn run_check(input: &Path) {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    match callmec::compile_to_asm(&source) {
        Ok(_) => println!("{}: ok", input.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
