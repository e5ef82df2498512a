//! A session compiles one program. It owns everything that must not leak
//! between compilations: the symbol table and the temporary and label
//! counters.

use std::path::{Path, PathBuf};

use colored::Colorize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    backend::{Assembly, CodegenOptions, targets::CodeGenerator},
    frontend::{SourceFile, ast, lexer::SyntaxError, parser::Parser},
    middle::{
        ir::{self, NameGenerator, lowering::IrGenerator, pretty_print::pretty_print_ir},
        optimization::peephole::optimize,
        scope::SymbolTable,
        semantic::{SemanticAnalyzer, SemanticError},
        ssa::to_ssa,
    },
};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("found {} semantic error(s)", .0.len())]
    Semantic(Vec<SemanticError>),
    #[error("failed to write `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which instruction stream the SSA renamer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SsaSource {
    #[default]
    Raw,
    Optimized,
}

/// An artifact that can be written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, strum::EnumIter)]
pub enum EmitKind {
    /// Three-address code as generated
    Tac,
    /// Three-address code in single assignment form
    Ssa,
    /// Optimized three-address code
    Opt,
    /// NASM assembly
    Asm,
}

impl EmitKind {
    pub fn extension(self) -> &'static str {
        match self {
            EmitKind::Tac => "tac",
            EmitKind::Ssa => "ssa",
            EmitKind::Opt => "opt.tac",
            EmitKind::Asm => "asm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run the peephole optimizer before code generation
    pub optimize: bool,
    pub ssa_source: SsaSource,
    pub codegen: CodegenOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            ssa_source: SsaSource::default(),
            codegen: CodegenOptions::default(),
        }
    }
}

/// Everything one compilation produces
#[derive(Debug)]
pub struct Artifacts {
    pub ir: ir::Program,
    /// Absent when optimization is disabled
    pub optimized: Option<ir::Program>,
    pub ssa: ir::Program,
    pub assembly: Assembly,
    pub symbols: SymbolTable,
}

#[derive(Debug, Default)]
pub struct Session {
    options: SessionOptions,
    symbols: SymbolTable,
    names: NameGenerator,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            symbols: SymbolTable::new(),
            names: NameGenerator::new(),
        }
    }

    pub fn compile_source(self, source: &SourceFile) -> Result<Artifacts, CompileError> {
        let program = Parser::parse_program(source)?;

        self.compile(&program)
    }

    /// Runs every pass in order. Nothing after semantic analysis runs if it
    /// reported any error.
    pub fn compile(mut self, program: &ast::Program) -> Result<Artifacts, CompileError> {
        let errors = SemanticAnalyzer::analyze(program, &mut self.symbols);
        if !errors.is_empty() {
            return Err(CompileError::Semantic(errors));
        }

        let ir = IrGenerator::lower_program(program, &mut self.names);
        let optimized = self.options.optimize.then(|| optimize(&ir));

        let ssa = match (self.options.ssa_source, &optimized) {
            (SsaSource::Optimized, Some(optimized)) => to_ssa(optimized),
            _ => to_ssa(&ir),
        };

        let codegen_input = optimized.as_ref().unwrap_or(&ir);
        let assembly = self
            .options
            .codegen
            .target
            .get_code_generator()
            .translate_to_asm(codegen_input, &self.options.codegen);

        debug!(
            ir = ir.len(),
            optimized = optimized.as_ref().map(ir::Program::len),
            ssa = ssa.len(),
            "compilation finished"
        );

        Ok(Artifacts {
            ir,
            optimized,
            ssa,
            assembly,
            symbols: self.symbols,
        })
    }
}

impl Artifacts {
    /// Text of an artifact, or `None` if it was not produced
    pub fn render(&self, kind: EmitKind) -> Option<String> {
        match kind {
            EmitKind::Tac => Some(self.ir.to_string()),
            EmitKind::Ssa => Some(self.ssa.to_string()),
            EmitKind::Opt => self.optimized.as_ref().map(ToString::to_string),
            EmitKind::Asm => Some(self.assembly.to_string()),
        }
    }

    /// Writes `<stem>.<extension>` into `directory` for each requested kind
    pub fn write_to(
        &self,
        directory: &Path,
        stem: &str,
        kinds: &[EmitKind],
    ) -> Result<Vec<PathBuf>, CompileError> {
        let mut written = Vec::new();

        for kind in kinds {
            let Some(contents) = self.render(*kind) else {
                continue;
            };

            let path = directory.join(format!("{stem}.{}", kind.extension()));

            std::fs::write(&path, contents).map_err(|source| CompileError::Io {
                path: path.clone(),
                source,
            })?;

            info!(path = %path.display(), "wrote artifact");

            written.push(path);
        }

        Ok(written)
    }

    pub fn pretty_print(&self, kinds: &[EmitKind]) {
        for kind in kinds {
            match kind {
                EmitKind::Tac => pretty_print_ir("three-address code", &self.ir),
                EmitKind::Ssa => pretty_print_ir("single assignment form", &self.ssa),
                EmitKind::Opt => {
                    if let Some(optimized) = &self.optimized {
                        pretty_print_ir("optimized three-address code", optimized);
                    }
                }
                EmitKind::Asm => {
                    println!("{}", "; assembly".bright_black());
                    for line in self.assembly.lines() {
                        if line.ends_with(':') {
                            println!("{}", line.bright_red());
                        } else if line.starts_with("section") {
                            println!("{}", line.magenta());
                        } else {
                            println!("{line}");
                        }
                    }
                    println!();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{backend::targets::Target, middle::types::Type};

    fn compile(source: &str, options: SessionOptions) -> Result<Artifacts, CompileError> {
        Session::new(options).compile_source(&SourceFile::in_memory(source))
    }

    #[test]
    fn produces_every_artifact() {
        let artifacts = compile("int x; x = 2 + 3; print(x);", SessionOptions::default()).unwrap();

        assert_eq!(
            artifacts.render(EmitKind::Tac).unwrap(),
            indoc! {"
                DECL INT x
                t1 = 2 + 3
                x = t1
                PRINT x
            "}
        );
        assert_eq!(
            artifacts.render(EmitKind::Opt).unwrap(),
            indoc! {"
                DECL INT x
                t1 = 5
                x = t1
                PRINT x
            "}
        );
        assert_eq!(
            artifacts.render(EmitKind::Ssa).unwrap(),
            indoc! {"
                DECL INT x
                t1 = 2 + 3
                x#1 = t1
                PRINT x#1
            "}
        );
        assert!(
            artifacts
                .assembly
                .text
                .contains(&"    mov dword [tmp_1], 5".to_owned())
        );
        assert_eq!(artifacts.symbols.depth(), 0);
    }

    #[test]
    fn semantic_errors_stop_compilation() {
        let result = compile("int x; int x; y = 1; x = \"s\";", SessionOptions::default());

        let Err(CompileError::Semantic(errors)) = result else {
            panic!("expected semantic errors");
        };

        assert_eq!(errors.len(), 3);
        assert_eq!(
            CompileError::Semantic(errors).to_string(),
            "found 3 semantic error(s)"
        );
    }

    #[test]
    fn syntax_errors_are_reported() {
        let result = compile("int x = ;", SessionOptions::default());

        assert!(matches!(result, Err(CompileError::Syntax(_))));
    }

    #[test]
    fn repeated_compilations_are_identical() {
        let source = "int i = 0; while (i < 3) { print(i); i++; }";

        let first = compile(source, SessionOptions::default()).unwrap();
        let second = compile(source, SessionOptions::default()).unwrap();

        assert_eq!(first.ir, second.ir);
        assert_eq!(first.assembly, second.assembly);
        assert!(first.render(EmitKind::Tac).unwrap().contains("t1 = i < 3"));
    }

    #[test]
    fn unoptimized_session_generates_from_raw_ir() {
        let artifacts = compile(
            "int x; x = 2 + 3;",
            SessionOptions {
                optimize: false,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(artifacts.optimized.is_none());
        assert!(artifacts.render(EmitKind::Opt).is_none());
        assert!(artifacts.assembly.text.contains(&"    add eax, 3".to_owned()));
    }

    #[test]
    fn ssa_can_follow_optimized_ir() {
        let artifacts = compile(
            "int x; if (true) { x = 1; }",
            SessionOptions {
                ssa_source: SsaSource::Optimized,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(artifacts.render(EmitKind::Ssa).unwrap(), "DECL INT x\nx#1 = 1\n");
    }

    #[test]
    fn symbol_table_survives_compilation() {
        let artifacts = compile(
            "int i = 4; int y; y = i++; { string s; }",
            SessionOptions {
                codegen: CodegenOptions {
                    target: Target::I686Linux,
                    emit_comments: false,
                },
                ..Default::default()
            },
        )
        .unwrap();

        let y = artifacts.symbols.lookup("y").unwrap();
        assert_eq!(y.ty, Type::Int);
        assert_eq!(artifacts.symbols.entries().len(), 3);
        assert_eq!(artifacts.assembly.entry_symbol, "main");
    }

    #[test]
    fn shadowed_declarations_get_separate_storage() {
        let artifacts = compile(
            "int x = 1; { int x = 2; } print(x);",
            SessionOptions {
                codegen: CodegenOptions {
                    target: Target::I686Linux,
                    emit_comments: false,
                },
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(
            artifacts.render(EmitKind::Tac).unwrap(),
            indoc! {"
                DECL INT x
                x = 1
                DECL INT x.1
                x.1 = 2
                PRINT x
            "}
        );
        assert_eq!(artifacts.assembly.storage, vec!["v_x resd 1", "v_x.1 resd 1"]);
        assert!(
            artifacts
                .assembly
                .text
                .windows(2)
                .any(|lines| lines == ["    push dword [v_x]", "    push fmt_int"])
        );
    }

    #[test]
    fn writes_requested_artifacts() {
        let directory =
            std::env::temp_dir().join(format!("tacc-session-test-{}", std::process::id()));
        std::fs::create_dir_all(&directory).unwrap();

        let artifacts = compile("print(\"hi\");", SessionOptions::default()).unwrap();
        let written = artifacts
            .write_to(&directory, "hello", &[EmitKind::Tac, EmitKind::Opt, EmitKind::Asm])
            .unwrap();

        assert_eq!(
            written,
            vec![
                directory.join("hello.tac"),
                directory.join("hello.opt.tac"),
                directory.join("hello.asm"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(directory.join("hello.tac")).unwrap(),
            "PRINT \"hi\"\n"
        );

        std::fs::remove_dir_all(&directory).unwrap();
    }
}
