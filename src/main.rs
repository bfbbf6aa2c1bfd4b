//! CIR command-line driver
//!
//! Assembles a source file (or loads bytecode), optionally writes the
//! bytecode out, and runs `main` with the standard externals
//! registered.

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cir_assembler::Assembler;
use cir_runtime::{stdlib, Cir};

#[derive(Parser, Debug)]
#[command(name = "cir")]
#[command(about = "Assemble and run CIR programs")]
struct Args {
    /// Assembly source file (or bytecode with --skip-compile)
    input: PathBuf,

    /// Write the assembled bytecode to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat the input as bytecode instead of assembly source
    #[arg(long)]
    skip_compile: bool,

    /// Assemble only; do not execute
    #[arg(long)]
    skip_run: bool,

    /// Print the value stack after execution
    #[arg(long)]
    show_stack: bool,

    /// Print non-null registers after execution
    #[arg(long)]
    show_registers: bool,

    /// Print a disassembly listing of the loaded program
    #[arg(long)]
    disassemble: bool,

    /// Report wall-clock execution time
    #[arg(long)]
    benchmark: bool,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&args.log_level))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&args) {
        error!("{:#}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut vm = Cir::new();

    if args.skip_compile {
        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("reading {}", args.input.display()))?;
        vm.from_bytecode(&bytes)?;
    } else {
        let mut asm = Assembler::new();
        asm.assemble_file(&args.input)
            .with_context(|| format!("assembling {}", args.input.display()))?;
        if let Some(out) = &args.output {
            asm.write_bytecode(out)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), "bytecode written");
        }
        vm.load_program(asm.into_program());
    }

    debug!(hash = %hex(&vm.get_program().hash()), "program loaded");

    if args.disassemble {
        print!("{}", cir_disassembler::disassemble(vm.get_program()));
    }

    if args.skip_run {
        return Ok(());
    }

    stdlib::register(&mut vm);

    let started = Instant::now();
    vm.execute_program()?;
    if args.benchmark {
        info!(elapsed = ?started.elapsed(), "execution finished");
    }

    if args.show_stack {
        println!("Stack ({} values):", vm.get_stack().len());
        for (depth, value) in vm.get_stack().iter().rev().enumerate() {
            println!("  [{}] {}", depth, value);
        }
    }

    if args.show_registers {
        println!("Registers:");
        for i in 0..=u8::MAX {
            let value = vm.getr(i);
            if !value.is_null() {
                println!("  r{} = {}", i, value);
            }
        }
    }

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
