// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for Wren scripts.

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use wren_embed_bridge::{Configuration, DEFAULT_MODULE, Error, ErrorKind, Vm, format_error};

use crate::loader::ModuleLoader;

/// REPL configuration constants
const HISTORY_FILE: &str = ".wren_embed_history";
const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &[
    "as", "break", "class", "construct", "continue", "else", "for", "foreign", "if", "import",
    "in", "is", "return", "static", "super", "var", "while",
];

const LITERALS: &[&str] = &["true", "false", "null", "this"];

const BUILTINS: &[&str] = &[
    "Bool", "Class", "Fiber", "List", "Null", "Num", "Object", "Range", "String", "System",
];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let parts: Vec<&str> = rest.splitn(2, char::is_whitespace).collect();
        let cmd = parts.first()?.to_lowercase();
        let arg = parts.get(1).copied();

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Load and run a Wren file"),
        ]
    }
}

/// Helper struct for rustyline that provides completion, hints, and validation
struct WrenHelper {
    words: Vec<String>,
}

impl WrenHelper {
    fn new() -> Self {
        let words = KEYWORDS
            .iter()
            .chain(LITERALS)
            .chain(BUILTINS)
            .copied()
            .chain(["System.print", "System.write", "Fiber.abort"])
            .chain(ReplCommand::all_commands().iter().map(|(cmd, _)| {
                cmd.split_whitespace().next().unwrap_or(cmd)
            }))
            .map(String::from)
            .collect();

        Self { words }
    }
}

fn word_start(line: &str) -> usize {
    line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for WrenHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for WrenHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line)..];
        if word.len() < 2 {
            return None;
        }

        self.words
            .iter()
            .find(|w| w.starts_with(word) && w.len() > word.len())
            .map(|w| w[word.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for WrenHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();

        for c in line.chars() {
            if c.is_alphanumeric() || c == '_' {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            let colored = match c {
                '(' | ')' | '[' | ']' | '{' | '}' => c.to_string().yellow().to_string(),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '&' | '|' | '^' => {
                    c.to_string().cyan().to_string()
                }
                '"' => c.to_string().green().to_string(),
                '.' if line.starts_with('.') => c.to_string().magenta().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if LITERALS.contains(&word) {
        word.blue().to_string()
    } else if BUILTINS.contains(&word) {
        word.cyan().to_string()
    } else if word.chars().all(|c| c.is_ascii_digit() || c == '.') {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for WrenHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();

        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }

        // A trailing operator continues the expression on the next line
        let trimmed = input.trim_end();
        if trimmed.ends_with(['+', '-', '*', '/', '=', ',', '{', '(', '[', '\\']) {
            return Ok(ValidationResult::Incomplete);
        }

        Ok(ValidationResult::Valid(None))
    }
}

/// Check if brackets, braces, and parentheses are balanced
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ')' | ']' | '}' => {
                if stack.pop() != Some(c) {
                    return true; // Unbalanced, let the compiler report it
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && !in_string
}

impl Helper for WrenHelper {}

/// Prints errors reported by the VM in color
fn print_reported(kind: ErrorKind, module: Option<&str>, line: i32, message: &str) {
    match kind {
        ErrorKind::StackTrace => eprintln!("  {}", format_error(kind, module, line, message).dimmed()),
        _ => eprintln!("{}", format_error(kind, module, line, message).red()),
    }
}

/// The interactive REPL
pub struct Repl {
    vm: Vm,
    editor: Editor<WrenHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new() -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(WrenHelper::new()));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wren-embed")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        let config = ModuleLoader::new(".").install(Configuration::new().with_error(print_reported));

        Ok(Self {
            vm: Vm::new(config),
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "wren>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.interpret(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);

        println!();
        println!("{}", "Goodbye!".bright_cyan());
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "wren-embed".white().bold(),
            "v".dimmed(),
            wren_embed_bridge::VERSION.bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => print_version(),
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path.trim())),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
        }
        CommandResult::Continue
    }

    fn load_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(source) => self.interpret(&source),
            Err(err) => eprintln!("{}: {}: {}", "Error".red().bold(), path.display(), err),
        }
    }

    fn interpret(&mut self, source: &str) {
        match self.vm.interpret(DEFAULT_MODULE, source) {
            Ok(()) => {}
            // Already reported through the error callback
            Err(Error::Compile(_) | Error::Runtime(_)) => {}
            Err(err) => eprintln!("{}: {}", "Error".red().bold(), err),
        }
    }
}

fn print_help() {
    println!();
    println!("{}", "REPL Commands:".white().bold());
    println!();
    for (cmd, desc) in ReplCommand::all_commands() {
        println!("  {:16} {}", cmd.cyan(), desc.dimmed());
    }
    println!();
    println!("{}", "Keyboard Shortcuts:".white().bold());
    println!();
    println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
    println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
    println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
    println!("  {:16} {}", "↑/↓".yellow(), "Navigate history".dimmed());
    println!();
}

fn print_version() {
    println!();
    println!(
        "{}: {}",
        "wren-embed".bright_cyan().bold(),
        wren_embed_bridge::VERSION.yellow()
    );
    println!("{}: {}", "Engine API".dimmed(), wren_embed_bridge::engine_version());
    println!();
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}
