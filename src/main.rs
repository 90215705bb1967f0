// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! wren-embed - run Wren scripts through the embedding bridge
//!
//! ## Features
//!
//! - Interactive REPL with highlighting and history
//! - Script files with imports loaded from disk
//! - Embedding demos for call handles and foreign classes

mod demos;
mod loader;
mod repl;

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wren_embed_bridge::{Configuration, DEFAULT_MODULE, Error, InterpretResult, VERSION, Vm};

use demos::Demo;
use loader::ModuleLoader;

/// Exit status for compile errors
const EXIT_COMPILE_ERROR: u8 = 65;
/// Exit status for runtime errors
const EXIT_RUNTIME_ERROR: u8 = 70;

#[derive(Parser)]
#[command(
    name = "wren-embed",
    about = "Run Wren scripts through the embedding bridge",
    version = VERSION,
    author = "Pegasus Heavy Industries",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Wren file to execute
    script: Option<PathBuf>,

    /// Evaluate source from the command line
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Start interactive REPL
    #[arg(short = 'i', long = "interactive", alias = "repl")]
    interactive: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an embedding demo
    Demo {
        #[arg(value_enum)]
        demo: Demo,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wren_embed=debug,wren_embed_bridge=debug,wren_embed_sys=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("wren_embed=warn,wren_embed_bridge=warn,wren_embed_sys=warn")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Some(Command::Demo { demo }) = cli.command {
        demo.run(Configuration::new())?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(code) = cli.eval {
        return Ok(exit_code(run_source(Path::new("."), &code)));
    }

    if let Some(script) = cli.script {
        let source = std::fs::read_to_string(&script)
            .with_context(|| format!("could not read '{}'", script.display()))?;
        let root = script.parent().unwrap_or(Path::new("."));
        return Ok(exit_code(run_source(root, &source)));
    }

    if cli.interactive || atty::is(atty::Stream::Stdin) {
        let mut repl = repl::Repl::new().context("failed to initialize REPL")?;
        repl.run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut source = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut source)?;
    Ok(exit_code(run_source(Path::new("."), &source)))
}

/// Runs `source` as the main module, loading imports below `root`.
fn run_source(root: &Path, source: &str) -> InterpretResult {
    let vm = Vm::new(ModuleLoader::new(root).install(Configuration::new()));
    let result = vm.interpret(DEFAULT_MODULE, source);

    match &result {
        // Already printed by the error callback
        Ok(()) | Err(Error::Compile(_) | Error::Runtime(_)) => {}
        Err(err) => eprintln!("{}: {}", "Error".red().bold(), err),
    }
    InterpretResult::of(&result)
}

fn exit_code(result: InterpretResult) -> ExitCode {
    match result {
        InterpretResult::Success => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}
