//! Debugger-session commands that have no protocol counterpart in this bridge
//!
//! A generic debugger front end issues these regardless of what backs the session. The
//! bridge either rejects them outright or accepts them without doing anything.

use std::path::PathBuf;

/// A breakpoint as seen by the debugger front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation {
    pub file: PathBuf,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AttachToProcess { process_id: i64 },
    Detach,
    InsertBreakpoint(BreakpointLocation),
    Backtrace { process_id: i64, thread_id: i64 },

    Continue,
    StepLine,
    NextLine,
    StepInstruction,
    NextInstruction,
    Finish,
    SetActiveThread { process_id: i64, thread_id: i64 },
    RemoveBreakpoint(BreakpointLocation),
    EnableBreakpoint { location: BreakpointLocation, enable: bool },
    UpdateBreakpoint(BreakpointLocation),
}

/// How the bridge treats a [`Command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    NotSupported,
    Ignored,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AttachToProcess { .. } => "attach",
            Command::Detach => "detach",
            Command::InsertBreakpoint(_) => "insert breakpoint",
            Command::Backtrace { .. } => "backtrace",
            Command::Continue => "continue",
            Command::StepLine => "step line",
            Command::NextLine => "next line",
            Command::StepInstruction => "step instruction",
            Command::NextInstruction => "next instruction",
            Command::Finish => "finish",
            Command::SetActiveThread { .. } => "set active thread",
            Command::RemoveBreakpoint(_) => "remove breakpoint",
            Command::EnableBreakpoint { .. } => "enable breakpoint",
            Command::UpdateBreakpoint(_) => "update breakpoint",
        }
    }

    pub(crate) fn disposition(&self) -> Disposition {
        match self {
            Command::AttachToProcess { .. }
            | Command::Detach
            | Command::InsertBreakpoint(_)
            | Command::Backtrace { .. } => Disposition::NotSupported,
            _ => Disposition::Ignored,
        }
    }
}
