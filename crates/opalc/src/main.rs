//! `opalc` command-line entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use opalc::report;
use opalc::Compiler;

#[derive(Parser)]
#[command(name = "opalc", version, about = "The Opal compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    Tokens,
    Ast,
    Mir,
    Artifacts,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file and write artifacts.
    Build {
        file: PathBuf,
        /// Output directory for artifacts.
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
        /// Dump an intermediate representation instead of artifacts.
        #[arg(long, value_enum)]
        emit: Option<EmitKind>,
        /// Colored diagnostics.
        #[arg(long, default_value_t = true)]
        color: bool,
    },
    /// Type-check without generating code.
    Check {
        file: PathBuf,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = true)]
        color: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            file,
            out,
            emit,
            color,
        } => build(&file, &out, emit, color),
        Command::Check { file, json, color } => check(&file, json, color),
    }
}

fn read_source(file: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(file).map_err(|err| {
        eprintln!("opalc: cannot read {}: {err}", file.display());
        ExitCode::FAILURE
    })
}

fn build(file: &Path, out: &Path, emit: Option<EmitKind>, color: bool) -> ExitCode {
    let source = match read_source(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let file_name = file.display().to_string();
    let mut compiler = Compiler::new();

    match emit {
        Some(EmitKind::Tokens) => {
            let mut sink = opal_common::diag::DiagnosticSink::new();
            let tokens = opal_lexer::Lexer::tokenize(&source, &mut sink);
            for token in &tokens {
                println!("{:?} @ {}..{}", token.kind, token.span.start, token.span.end);
            }
            return report_and_exit(&sink.into_vec(), &file_name, &source, color);
        }
        Some(EmitKind::Ast) => {
            let mut sink = opal_common::diag::DiagnosticSink::new();
            let program = opal_parser::parse(&source, &mut sink);
            match serde_json::to_string_pretty(&program) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("opalc: cannot serialize AST: {err}"),
            }
            return report_and_exit(&sink.into_vec(), &file_name, &source, color);
        }
        Some(EmitKind::Mir) => {
            return match compiler.emit_mir(&source, &file_name) {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(diagnostics) => report_and_exit(&diagnostics, &file_name, &source, color),
            };
        }
        Some(EmitKind::Artifacts) | None => {}
    }

    let compilation = compiler.compile(&source, &file_name);
    eprint!(
        "{}",
        report::render_pretty(&compilation.diagnostics, &file_name, &source, color)
    );
    let Some(artifacts) = compilation.artifacts else {
        return ExitCode::FAILURE;
    };

    if let Err(err) = std::fs::create_dir_all(out) {
        eprintln!("opalc: cannot create {}: {err}", out.display());
        return ExitCode::FAILURE;
    }
    let mut names: Vec<&String> = artifacts.keys().collect();
    names.sort();
    for name in names {
        let path = out.join(format!("{}.mir", name.replace('/', ".")));
        if let Err(err) = std::fs::write(&path, &artifacts[name]) {
            eprintln!("opalc: cannot write {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn check(file: &Path, json: bool, color: bool) -> ExitCode {
    let source = match read_source(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let file_name = file.display().to_string();
    let diagnostics = Compiler::new().check(&source, &file_name);

    if json {
        println!("{}", report::render_json(&diagnostics, &file_name, &source));
    } else {
        eprint!(
            "{}",
            report::render_pretty(&diagnostics, &file_name, &source, color)
        );
    }
    let failed = diagnostics
        .iter()
        .any(|d| d.severity == opal_common::diag::Severity::Error);
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn report_and_exit(
    diagnostics: &[opal_common::diag::Diagnostic],
    file: &str,
    source: &str,
    color: bool,
) -> ExitCode {
    eprint!("{}", report::render_pretty(diagnostics, file, source, color));
    let failed = diagnostics
        .iter()
        .any(|d| d.severity == opal_common::diag::Severity::Error);
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
