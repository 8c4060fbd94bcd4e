//! Pseudoc CLI
//!
//! Main entry point for the `psc` command.

use clap::{Parser, Subcommand};
use miette::Result;
use pseudoc::config::{Config, DebuggerConfig};
use pseudoc::vm::{Stop, StopReason};
use pseudoc::{Reporter, Session, SessionError, SourceFile};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "psc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler and stepping virtual machine for pseudocode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a source file and report its diagnostics
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Emit an intermediate representation as JSON
        #[arg(long, value_enum)]
        emit: Option<EmitType>,
    },

    /// Run a program, reading `leer` input from stdin
    Run {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Start the interactive debugger
    Debug {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show information about the compiler
    Info,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitType {
    /// Abstract Syntax Tree
    Ast,
    /// Bytecode with its source map and memory templates
    Bytecode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref()).map_err(|e| miette::miette!("{e}"))?;

    match cli.command {
        Commands::Check { input, emit } => check(&input, emit),
        Commands::Run { input } => run(&input, &config),
        Commands::Debug { input } => debug(&input, &config),
        Commands::Info => info(),
    }
}

fn read_source(input: &Path) -> Result<String> {
    std::fs::read_to_string(input)
        .map_err(|e| miette::miette!("Failed to read input file: {}", e))
}

/// Render diagnostics and turn them into a failure
fn report(input: &Path, source: &str, errors: Vec<pseudoc::CompileError>) -> miette::Report {
    let mut reporter = Reporter::new(SourceFile::new(input.to_string_lossy(), source));
    reporter.extend(errors);
    reporter.emit_all();
    miette::miette!("{} error(s) found", reporter.error_count())
}

fn check(input: &Path, emit: Option<EmitType>) -> Result<()> {
    tracing::info!("Checking {:?}", input);
    let source = read_source(input)?;

    let ast = pseudoc::parse(&source).map_err(|errors| report(input, &source, errors))?;
    tracing::debug!("Parsed {} modules", ast.modules.len() + 1);
    if emit == Some(EmitType::Ast) {
        let json = serde_json::to_string_pretty(&ast)
            .map_err(|e| miette::miette!("Failed to serialize AST: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    let hir = pseudoc::analyze(&ast).map_err(|errors| report(input, &source, errors))?;
    if emit == Some(EmitType::Bytecode) {
        let program = pseudoc::bytecode::lower(&hir)
            .map_err(|error| report(input, &source, vec![error]))?;
        let json = serde_json::to_string_pretty(&program)
            .map_err(|e| miette::miette!("Failed to serialize bytecode: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    println!("All checks passed: {}", input.display());
    Ok(())
}

fn load(input: &Path, config: &Config) -> Result<Session> {
    let source = read_source(input)?;
    let mut session = Session::new(config.vm.clone());
    session
        .load(&source)
        .map_err(|errors| report(input, &source, errors))?;
    Ok(session)
}

/// Describe a run-time failure with the line it happened on
fn fault(session: &Session, error: SessionError) -> miette::Report {
    let line = session
        .machine()
        .and_then(|machine| machine.program().line_for(machine.ip()));
    match line {
        Some(line) => miette::miette!("line {}: {}", line, error),
        None => miette::miette!("{}", error),
    }
}

fn run(input: &Path, config: &Config) -> Result<()> {
    tracing::info!("Running {:?}", input);
    let mut session = load(input, config)?;
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let stop = session.run().map_err(|e| fault(&session, e))?;
        match stop.reason {
            StopReason::Write => {
                if let Some(value) = session.pending_write() {
                    println!("{}", value);
                }
            }
            StopReason::Read => {
                let line = lines
                    .next()
                    .transpose()
                    .map_err(|e| miette::miette!("Failed to read input: {}", e))?
                    .ok_or_else(|| miette::miette!("unexpected end of input"))?;
                session
                    .supply_input(&line)
                    .map_err(|e| fault(&session, e))?;
            }
            StopReason::Breakpoint | StopReason::Step => {}
            StopReason::Finished => break,
        }
    }
    tracing::debug!(executed = session.executed(), "program finished");
    Ok(())
}

// ==================== DEBUGGER ====================

const HELP: &str = "\
Commands:
  step, s          Execute up to the next statement
  run, r           Run until a breakpoint or the end
  break N, b N     Set a breakpoint on line N
  delete N, d N    Remove the breakpoint on line N
  breaks           List breakpoints
  print NAME [I..] Show a variable or one of its cells
  restart          Start the program over
  help, h          Show this help
  quit, q          Exit the debugger";

struct Debugger {
    session: Session,
    editor: DefaultEditor,
    config: DebuggerConfig,
}

impl Debugger {
    fn new(session: Session, config: DebuggerConfig) -> Result<Self> {
        let mut editor =
            DefaultEditor::new().map_err(|e| miette::miette!("Failed to start the editor: {}", e))?;
        if let Some(path) = &config.history_file {
            // a missing history file is not an error
            let _ = editor.load_history(path);
        }
        Ok(Self {
            session,
            editor,
            config,
        })
    }

    fn run(&mut self) -> Result<()> {
        println!("Pseudoc debugger v{}", env!("CARGO_PKG_VERSION"));
        println!("Type help for help, quit to exit");

        loop {
            let line = match self.editor.readline(&self.config.prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("readline error: {err}");
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(trimmed);
            if !self.command(trimmed)? {
                break;
            }
        }

        if let Some(path) = &self.config.history_file {
            if let Err(e) = self.editor.save_history(path) {
                tracing::warn!("cannot save history to {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Execute one command; `false` ends the session
    fn command(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(true);
        };
        let args: Vec<&str> = words.collect();

        match command {
            "quit" | "q" => return Ok(false),
            "help" | "h" => println!("{HELP}"),
            "step" | "s" => {
                self.resume(true)?;
            }
            "run" | "r" | "continue" | "c" => {
                self.resume(false)?;
            }
            "break" | "b" => match line_arg(&args) {
                Some(line) => match self.session.add_breakpoint(line) {
                    Ok(Some(actual)) => println!("breakpoint at line {actual}"),
                    Ok(None) => println!("no code at or after line {line}"),
                    Err(e) => println!("error: {e}"),
                },
                None => println!("usage: break LINE"),
            },
            "delete" | "d" => match line_arg(&args) {
                Some(line) => match self.session.remove_breakpoint(line) {
                    Ok(true) => println!("breakpoint removed"),
                    Ok(false) => println!("no breakpoint at line {line}"),
                    Err(e) => println!("error: {e}"),
                },
                None => println!("usage: delete LINE"),
            },
            "breaks" => {
                let lines: Vec<_> = self.session.breakpoints().iter().map(u32::to_string).collect();
                println!("breakpoints: {}", lines.join(", "));
            }
            "print" | "p" => self.print(&args),
            "restart" => match self.session.restart() {
                Ok(()) => println!("restarted"),
                Err(e) => println!("error: {e}"),
            },
            other => println!("unknown command `{other}`; type help"),
        }
        Ok(true)
    }

    /// Step or run, serving I/O until a real stop
    fn resume(&mut self, stepping: bool) -> Result<()> {
        loop {
            let result = if stepping {
                self.session.step()
            } else {
                self.session.run()
            };
            let stop = match result {
                Ok(stop) => stop,
                Err(e) => {
                    println!("error: {e}");
                    return Ok(());
                }
            };
            match stop.reason {
                StopReason::Write => {
                    if let Some(value) = self.session.pending_write() {
                        println!("{value}");
                    }
                }
                StopReason::Read => {
                    let prompt = match self.session.pending_read() {
                        Some(request) => format!("{} ({})? ", request.name, request.ty),
                        None => "? ".to_string(),
                    };
                    let line = match self.editor.readline(&prompt) {
                        Ok(line) => line,
                        Err(_) => return Ok(()),
                    };
                    if let Err(e) = self.session.supply_input(&line) {
                        println!("error: {e}");
                        return Ok(());
                    }
                }
                StopReason::Breakpoint => {
                    println!("breakpoint{}", at_line(&stop));
                    return Ok(());
                }
                StopReason::Step => {
                    println!("stopped{}", at_line(&stop));
                    return Ok(());
                }
                StopReason::Finished => {
                    println!("program finished");
                    return Ok(());
                }
            }
        }
    }

    fn print(&self, args: &[&str]) {
        let Some((name, indexes)) = args.split_first() else {
            println!("usage: print NAME [INDEX...]");
            return;
        };
        let indexes: std::result::Result<Vec<i64>, _> =
            indexes.iter().map(|i| i.parse::<i64>()).collect();
        let Ok(indexes) = indexes else {
            println!("indexes must be integers");
            return;
        };
        let value = if indexes.is_empty() {
            self.session.value_of(name)
        } else {
            self.session.cell_of(name, &indexes)
        };
        match value {
            Some(value) => println!("{name} = {value}"),
            None => println!("{name} is undefined or not initialized"),
        }
    }
}

fn line_arg(args: &[&str]) -> Option<u32> {
    args.first()?.parse().ok()
}

fn at_line(stop: &Stop) -> String {
    stop.line.map(|line| format!(" at line {line}")).unwrap_or_default()
}

fn debug(input: &Path, config: &Config) -> Result<()> {
    tracing::info!("Debugging {:?}", input);
    let session = load(input, config)?;
    Debugger::new(session, config.debugger.clone())?.run()
}

fn info() -> Result<()> {
    println!("Pseudoc");
    println!("Version: {}", pseudoc::VERSION);
    println!();
    println!("Language:");
    println!("  - Types: entero, real, caracter, logico and arrays of them");
    println!("  - Procedures and functions with by-value and by-reference parameters");
    println!("  - si, mientras, repetir, para; leer and escribir");
    println!();
    println!("Commands:");
    println!("  - check: diagnostics, --emit ast|bytecode");
    println!("  - run: execute with stdin/stdout");
    println!("  - debug: step, run and line breakpoints");

    Ok(())
}
