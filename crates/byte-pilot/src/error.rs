use std::io;
use std::path::Path;
use std::process::ExitCode;

use byte_machine::disasm::DisasmError;
use byte_machine::{AssemblerError, MachineFault};
use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("could not read {path}: {err}")]
    Read { path: String, err: io::Error },
    #[error("could not write {path}: {err}")]
    Write { path: String, err: io::Error },
    #[error("{0}")]
    Assemble(AssemblerError),
    #[error("machine fault: {0}")]
    Fault(MachineFault),
    #[error("disassembly failed: {0}")]
    Disassemble(DisasmError),
    #[error("console output failed: {0}")]
    Console(io::Error),
    #[error("could not encode machine state: {0}")]
    Json(serde_json::Error),
}

impl PilotError {
    pub fn read(path: &Path, err: io::Error) -> Self {
        PilotError::Read {
            path: path.display().to_string(),
            err,
        }
    }

    pub fn write(path: &Path, err: io::Error) -> Self {
        PilotError::Write {
            path: path.display().to_string(),
            err,
        }
    }

    /// Machine faults exit with 2, everything else with 1.
    pub fn exit_status(&self) -> u8 {
        match self {
            PilotError::Fault(_) => 2,
            _ => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

impl From<AssemblerError> for PilotError {
    fn from(err: AssemblerError) -> Self {
        PilotError::Assemble(err)
    }
}

impl From<MachineFault> for PilotError {
    fn from(fault: MachineFault) -> Self {
        PilotError::Fault(fault)
    }
}

impl From<DisasmError> for PilotError {
    fn from(err: DisasmError) -> Self {
        PilotError::Disassemble(err)
    }
}

impl From<serde_json::Error> for PilotError {
    fn from(err: serde_json::Error) -> Self {
        PilotError::Json(err)
    }
}
