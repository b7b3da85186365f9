use std::fmt::Display;
use std::io::{stderr, stdout, Write};

use colored::Colorize;

use crate::{
    error::FaultReason,
    isa::Word,
    runtime::{Effect, TraceEvent},
    state::RunState,
};

/// Receives structured events from the engine. Delivery is best-effort: a sink cannot
/// influence execution.
pub trait TraceSink {
    fn instruction(&mut self, event: &TraceEvent);

    /// The run stopped with `reason`, PC pointing at the offending instruction.
    fn fault(&mut self, _pc: Word, _reason: &FaultReason) {}
}

/// Discards everything.
#[derive(Clone, Copy, Default, Debug)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn instruction(&mut self, _event: &TraceEvent) {}
}

/// Collects every instruction event.
impl TraceSink for Vec<TraceEvent> {
    fn instruction(&mut self, event: &TraceEvent) {
        self.push(*event);
    }
}

impl<T: TraceSink + ?Sized> TraceSink for &mut T {
    fn instruction(&mut self, event: &TraceEvent) {
        (**self).instruction(event)
    }

    fn fault(&mut self, pc: Word, reason: &FaultReason) {
        (**self).fault(pc, reason)
    }
}

impl<T: TraceSink + ?Sized> TraceSink for Box<T> {
    fn instruction(&mut self, event: &TraceEvent) {
        (**self).instruction(event)
    }

    fn fault(&mut self, pc: Word, reason: &FaultReason) {
        (**self).fault(pc, reason)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Cyan,
    Red,
}

/// Print a right-aligned status word followed by a message, e.g. `  Assembling target a.asm`.
pub fn message(color: MsgColor, left: &str, right: impl Display) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Terminal rendering of traces and machine state.
///
/// Trace lines go to stderr so they never mix with program results on stdout. `minimal`
/// drops colour and decoration, suited for blackbox tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Output {
    minimal: bool,
}

impl Output {
    pub fn new(minimal: bool) -> Self {
        Output { minimal }
    }

    pub fn trace_line(&self, event: &TraceEvent) -> String {
        if self.minimal {
            return format!("{} {} {} ; {}", event.step, event.pc, event.instr, event.effect);
        }
        let effect = match event.effect {
            Effect::Jump { .. } | Effect::Halt => event.effect.to_string().cyan(),
            Effect::NotTaken => event.effect.to_string().dimmed(),
            _ => event.effect.to_string().normal(),
        };
        format!(
            "{:>6} {} {} {:<18} {}",
            event.step.to_string().dimmed(),
            format!("0x{:03x}", event.pc).bold(),
            format!("{:016b}", event.word).dimmed(),
            event.instr.to_string().blue(),
            effect,
        )
    }

    /// Dump registers and PC to stdout.
    pub fn print_registers(&self, state: &RunState) {
        let mut out = stdout().lock();
        // Best-effort, like the rest of the diagnostics
        let _ = self.write_registers(&mut out, state);
    }

    pub fn write_registers(&self, out: &mut impl Write, state: &RunState) -> std::io::Result<()> {
        if self.minimal {
            for (i, val) in state.registers().iter().enumerate() {
                writeln!(out, "R{i} {val}")?;
            }
            writeln!(out, "PC {}", state.pc())?;
            return Ok(());
        }

        writeln!(out, "\x1b[2m┌──────────────────────────────┐\x1b[0m")?;
        writeln!(out, "\x1b[2m│\x1b[0m        \x1b[3mhex          int\x1b[0m      \x1b[2m│\x1b[0m")?;
        for (i, val) in state.registers().iter().enumerate() {
            writeln!(
                out,
                "\x1b[2m│\x1b[0m \x1b[1m{:<4}\x1b[0m0x{:08x} {:>11} \x1b[2m│\x1b[0m",
                format!("R{i}"),
                val,
                val
            )?;
        }
        writeln!(
            out,
            "\x1b[2m│\x1b[0m \x1b[1mPC\x1b[0m  0x{:03x}                   \x1b[2m│\x1b[0m",
            state.pc()
        )?;
        writeln!(out, "\x1b[2m└──────────────────────────────┘\x1b[0m")
    }
}

impl TraceSink for Output {
    fn instruction(&mut self, event: &TraceEvent) {
        let _ = writeln!(stderr(), "{}", self.trace_line(event));
    }

    fn fault(&mut self, pc: Word, reason: &FaultReason) {
        let line = if self.minimal {
            format!("fault at {pc}: {reason}")
        } else {
            format!("{:>6} {} {}", "fault".red(), format!("0x{pc:03x}").bold(), reason)
        };
        let _ = writeln!(stderr(), "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{isa::Instr, symbol::Register};

    #[test]
    fn minimal_trace_line() {
        let event = TraceEvent {
            step: 3,
            pc: 2,
            word: 0x6312,
            instr: Instr::decode(0x6312).unwrap(),
            effect: Effect::Register {
                reg: Register::from_nibble(3),
                before: 0,
                after: 2,
            },
        };
        assert_eq!(
            Output::new(true).trace_line(&event),
            "3 2 DIV R3, R1, R2 ; R3 = 2 (was 0)"
        );
    }

    #[test]
    fn minimal_register_dump() {
        let mut state = RunState::new();
        state.write_register(1, 5).unwrap();
        state.write_register(15, -2).unwrap();
        let mut out = Vec::new();
        Output::new(true).write_registers(&mut out, &state).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 17);
        assert_eq!(lines[0], "R0 0");
        assert_eq!(lines[1], "R1 5");
        assert_eq!(lines[15], "R15 -2");
        assert_eq!(lines[16], "PC 0");
    }
}
