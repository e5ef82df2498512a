use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use strum::IntoEnumIterator;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::{
    backend::{CodegenOptions, targets::Target},
    frontend::{SourceFile, SourceFileOrigin},
    session::{CompileError, EmitKind, Session, SessionOptions, SsaSource},
};

mod backend;
mod frontend;
mod index;
mod middle;
mod session;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Programs to compile
    source_files: Vec<PathBuf>,

    /// Directory the artifacts are written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    target: Target,

    /// Artifacts to write (all of them if omitted)
    #[arg(long, value_enum, value_delimiter = ',')]
    emit: Vec<EmitKind>,

    /// Instruction stream the single assignment form is built from
    #[arg(long, value_enum, default_value = "raw")]
    ssa_from: SsaSource,

    /// Generate assembly from the unoptimized three-address code
    #[arg(long)]
    no_optimize: bool,

    /// Annotate the assembly with the instruction each block came from
    #[arg(long)]
    asm_comments: bool,

    /// Print a listing of every artifact
    #[arg(long)]
    print: bool,

    /// Print the symbol table after analysis
    #[arg(long)]
    symbols: bool,

    /// Log more (repeat for even more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            optimize: !self.no_optimize,
            ssa_source: self.ssa_from,
            codegen: CodegenOptions {
                target: self.target,
                emit_comments: self.asm_comments,
            },
        }
    }

    fn emit_kinds(&self) -> Vec<EmitKind> {
        if self.emit.is_empty() {
            EmitKind::iter().collect()
        } else {
            self.emit.clone()
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose);

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    if !args.out_dir.is_dir() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Output directory '{}' does not exist!", args.out_dir.display()),
            )
            .exit()
    }

    let emit_kinds = args.emit_kinds();
    let mut failed = false;

    for path in &args.source_files {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => {
                report(&format!("failed to read '{}': {error}", path.display()));
                failed = true;
                continue;
            }
        };

        let source_file = SourceFile {
            contents,
            origin: SourceFileOrigin::File(path.clone()),
        };

        debug!(file = %source_file.origin, "compiling");

        let artifacts = match Session::new(args.session_options()).compile_source(&source_file) {
            Ok(artifacts) => artifacts,
            Err(error) => {
                report_compile_error(&source_file, &error);
                failed = true;
                continue;
            }
        };

        if args.symbols {
            println!("{}", format!("; symbols of {}", source_file.origin).bright_black());
            print!("{}", artifacts.symbols);
            println!();
        }

        if args.print {
            artifacts.pretty_print(&emit_kinds);
        }

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_owned());

        if let Err(error) = artifacts.write_to(&args.out_dir, &stem, &emit_kinds) {
            report_compile_error(&source_file, &error);
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn report(message: &str) {
    eprintln!("{} {message}", "error:".red().bold());
}

fn report_compile_error(source_file: &SourceFile, error: &CompileError) {
    match error {
        CompileError::Syntax(error) => {
            eprintln!(
                "{} {}:{}:{}: {}",
                "error:".red().bold(),
                source_file.origin,
                source_file.row_for_position(error.span.start),
                source_file.column_for_position(error.span.start),
                error.message
            );
            eprintln!("{}", source_file.highlight_span(error.span));
        }
        CompileError::Semantic(errors) => {
            for error in errors {
                eprintln!("{} {}: {error}", "error:".red().bold(), source_file.origin);
            }
            eprintln!(
                "{}",
                format!("{}: {error}", source_file.origin).bright_black()
            );
        }
        CompileError::Io { .. } => report(&error.to_string()),
    }
}
