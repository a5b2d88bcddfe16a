//! `cxc`: compile and run a Cx source file.
//!
//! Translates `SOURCE` to icode and hands it to `cx-vm`. On a successful
//! run the process exits with the program's own `main` return value
//! (`0` for `void main`); a failed translation or a halted VM exits with
//! the corresponding negative abort code.

use clap::Parser as ClapParser;
use cx_core::error::AbortCode;
use cxc::parser::{CompiledProgram, FunctionBody};
use cxc::{parse_program, to_program_table, TranslationContext, TranslationOptions};
use cx_vm::Vm;
use std::path::PathBuf;
use std::process::ExitCode;

/// Compile and run a Cx source file.
#[derive(Debug, ClapParser)]
#[command(name = "cxc")]
struct Cli {
    /// Path to the `.cx` source file to compile and run.
    source: PathBuf,

    /// Echo each source line, numbered, as it is scanned.
    #[arg(long)]
    listing: bool,

    /// Print the assembled instruction vector for every function before
    /// handing the program to the VM.
    #[arg(long)]
    dump_icode: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(abort) => {
            eprintln!("cxc: {abort}");
            ExitCode::from(abort.exit_code().unsigned_abs() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<i32, AbortCode> {
    let source = std::fs::read_to_string(&cli.source).map_err(|_| AbortCode::SourceFileOpenFailed)?;

    if cli.listing {
        for (n, line) in source.lines().enumerate() {
            println!("{:5} {}", n + 1, line);
        }
    }

    let include_dirs = std::env::var_os("CX_STDLIB").map(|p| vec![PathBuf::from(p)]).unwrap_or_default();
    let origin_dir = cli.source.parent().map(|p| p.to_path_buf());
    let options = TranslationOptions {
        include_dirs,
        origin_dir,
        emit_listing: cli.listing,
        dump_icode: cli.dump_icode,
        ..Default::default()
    };
    let mut ctx = TranslationContext::new(options);

    let compiled = parse_program(&source, &mut ctx)?;

    if !ctx.diagnostics.is_empty() {
        for entry in ctx.diagnostics.entries() {
            eprintln!("line {}: {}", entry.line, entry.code);
        }
    }

    if cli.dump_icode {
        dump_icode(&compiled);
    }

    let table = to_program_table(&compiled, &ctx);
    let mut vm = Vm::new(table, compiled.entry).map_err(|_| AbortCode::RuntimeError)?;
    vm.run().map_err(|_| AbortCode::RuntimeError)
}

fn dump_icode(compiled: &CompiledProgram) {
    let mut ids: Vec<_> = compiled.functions.keys().copied().collect();
    ids.sort();
    for id in ids {
        let body: &FunctionBody = &compiled.functions[&id];
        println!("; function {id}");
        for (i, instr) in body.program.iter().enumerate() {
            println!("{i:5}  {instr}");
        }
    }
}
