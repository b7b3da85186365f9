use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{bail, IntoDiagnostic, Result};

use huobz::output::{message, MsgColor, NullSink, Output, TraceSink};
use huobz::{program, Assembler, Engine, ExecutionOutcome, Instr, Word};

/// Huobz is an assembler and interpreter for the Huobz 16-bit instruction set.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a text `.asm`, encoded `.bin` or packed `.hbz` file and print the final registers
    Run {
        /// File to run
        name: PathBuf,
        /// Fault after executing this many instructions
        #[arg(short, long)]
        budget: Option<u64>,
        /// Print every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a `.asm` file into an encoded program
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination of the encoded program
        dest: Option<PathBuf>,
        /// `text` writes one line of 16 binary digits per instruction, `binary` packed words
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Check a `.asm` file without running or outputting an encoded program
    Check {
        /// File to check
        name: PathBuf,
    },
    /// List the instructions of a `.asm`, `.bin` or `.hbz` file with their addresses
    Disasm {
        /// File to disassemble
        name: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Binary,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Text => "bin",
            Format::Binary => "hbz",
        }
    }
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(huobz::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Err(e) = huobz::env::init() {
        bail!(
            code = "env::step_budget",
            help = "unset the variable or pass `--budget` to run without it",
            "{e}"
        );
    }

    match args.command {
        Some(Command::Run {
            name,
            budget,
            trace,
            minimal,
        }) => run(&name, budget, trace, minimal),
        Some(Command::Compile { name, dest, format }) => {
            file_message(Green, "Assembling", &name);
            let words = assemble(&name)?;

            let dest = dest.unwrap_or_else(|| name.with_extension(format.extension()));
            let contents = match format {
                Format::Text => program::to_text(&words).into_bytes(),
                Format::Binary => program::to_bytes(&words),
            };
            fs::write(&dest, contents).into_diagnostic()?;

            message(Green, "Finished", format!("{} instructions", words.len()));
            file_message(Green, "Saved", &dest);
            Ok(())
        }
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let assembly = Assembler::new(name.display().to_string(), &src).assemble()?;
            message(
                Green,
                "Success",
                format!(
                    "no errors found! ({} instructions, {} labels)",
                    assembly.words.len(),
                    assembly.labels.len()
                ),
            );
            Ok(())
        }
        Some(Command::Disasm { name }) => {
            for (addr, word) in load(&name)?.into_iter().enumerate() {
                match Instr::decode(word) {
                    Ok(instr) => println!("{addr:>4}  {word:016b}  {instr}"),
                    Err(e) => println!("{addr:>4}  {word:016b}  ; {e}"),
                }
            }
            Ok(())
        }
        None => match args.path {
            Some(path) => run(&path, None, false, false),
            None => {
                println!("\n~ huobz v{VERSION} ~");
                println!("{SHORT_INFO}");
                Ok(())
            }
        },
    }
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    message(color, left, format!("target {}", right.display()));
}

fn run(name: &Path, budget: Option<u64>, trace: bool, minimal: bool) -> Result<()> {
    if minimal {
        colored::control::set_override(false);
    }
    let words = load(name)?;

    let output = Output::new(minimal);
    let sink: Box<dyn TraceSink> = if trace || huobz::env::is_trace_enabled() {
        Box::new(output)
    } else {
        Box::new(NullSink)
    };
    let mut engine = Engine::new(words, budget.or(huobz::env::step_budget())).with_sink(sink);

    message(MsgColor::Green, "Running", "loaded program");
    let outcome = engine.run();
    output.print_registers(engine.state());

    match outcome {
        ExecutionOutcome::Halted => {
            message(
                MsgColor::Cyan,
                "Halted",
                format!("after {} instructions", engine.steps()),
            );
            file_message(MsgColor::Green, "Completed", name);
            Ok(())
        }
        ExecutionOutcome::Faulted(reason) => {
            message(MsgColor::Red, "Faulted", reason);
            bail!(
                code = "run::fault",
                help = "registers and memory above are as of the failing instruction",
                "Program faulted at address {}: {reason}",
                engine.pc()
            )
        }
    }
}

/// Read an encoded program, assembling it first if it is source text.
fn load(name: &Path) -> Result<Vec<Word>> {
    let Some(ext) = name.extension().and_then(|ext| ext.to_str()) else {
        bail!("File has no extension. Exiting...");
    };
    match ext {
        "asm" => {
            file_message(MsgColor::Green, "Assembling", name);
            assemble(name)
        }
        "bin" => {
            let text = fs::read_to_string(name).into_diagnostic()?;
            Ok(program::from_text(&text).into_diagnostic()?)
        }
        "hbz" => {
            let bytes = fs::read(name).into_diagnostic()?;
            Ok(program::from_bytes(&bytes).into_diagnostic()?)
        }
        _ => bail!("File has unknown extension. Exiting..."),
    }
}

fn assemble(name: &Path) -> Result<Vec<Word>> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let assembly = Assembler::new(name.display().to_string(), &src).assemble()?;
    Ok(assembly.words)
}

const SHORT_INFO: &str = r"
Welcome to huobz, an assembler and interpreter for the Huobz 16-bit instruction set.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
