use std::process;

use clap::{Parser, Subcommand};
use deparse::bytecode::disasm::disassemble;
use deparse::lang::dumper::TokenDumper;
use deparse::parse::CompileMode;
use deparse::{Bundle, DeparseError, DeparseOptions, code_deparse};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Reconstruct source text from recorded bytecode parses")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the instruction listing of every code object in a bundle
    Disasm { bundle: String },

    /// Print the scanner tokens of every code object in a bundle
    Tokens {
        bundle: String,
        #[arg(long)]
        no_color: bool,
        /// Show raw operands next to the printable ones
        #[arg(long)]
        attr: bool,
    },

    /// Render a bundle back to source
    Render {
        bundle: String,
        /// Keep going after shape errors and print the partial text
        #[arg(long)]
        tolerate: bool,
        #[arg(long, default_value = "exec")]
        mode: CompileMode,
        /// Keep compiler-generated statements
        #[arg(long)]
        keep_internal: bool,
        /// Write `return None` explicitly
        #[arg(long)]
        return_none: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Disasm { bundle } => {
            let bundle = load(&bundle);
            print!("{}", disassemble(&bundle.code));
        }
        Command::Tokens { bundle, no_color, attr } => {
            let bundle = load(&bundle);
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            if attr {
                dumper = dumper.with_attr();
            }
            dumper.dump(&bundle.code);
        }
        Command::Render {
            bundle,
            tolerate,
            mode,
            keep_internal,
            return_none,
        } => {
            let bundle = load(&bundle);
            let opts = DeparseOptions::new()
                .with_compile_mode(mode)
                .with_tolerate_errors(tolerate)
                .with_hide_internal(!keep_internal)
                .with_return_none(return_none);
            render(&bundle, &opts);
        }
    }
}

fn load(path: &str) -> Bundle {
    match Bundle::load(path) {
        Ok(bundle) => bundle,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            process::exit(1);
        }
    }
}

fn render(bundle: &Bundle, opts: &DeparseOptions) {
    let mut parser = bundle.parser();
    match code_deparse(&bundle.code, &mut parser, opts) {
        Ok(deparsed) => print!("{}", deparsed.text),
        Err(DeparseError::Grammar { diagnostics, partial }) => {
            print!("{}", partial);
            eprintln!("Render error: {} grammar error(s)", diagnostics.len());
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Render error: {}", e);
            process::exit(1);
        }
    }
}