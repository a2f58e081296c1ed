use std::fs;
use std::io::{self, Write};
use std::path::Path;

use byte_machine::disasm::disassemble;
use byte_machine::{Cpu, MachineFault, Memory, Snapshot, assemble_source};
use tracing::{debug, info};

use crate::args::Command;
use crate::console::Console;
use crate::error::PilotError;

/// How a run ended. The snapshot is taken even when the machine faulted.
#[derive(Debug)]
pub struct Outcome {
    pub snapshot: Snapshot,
    pub fault: Option<MachineFault>,
}

pub fn dispatch(command: Command) -> Result<(), PilotError> {
    match command {
        Command::Asm { source, output } => {
            let code = assemble_file(&source)?;
            fs::write(&output, &code).map_err(|err| PilotError::write(&output, err))?;
            info!(bytes = code.len(), output = %output.display(), "wrote bytecode");
            Ok(())
        }
        Command::Run {
            file,
            bytecode,
            dump_state,
        } => {
            let code = if bytecode {
                fs::read(&file).map_err(|err| PilotError::read(&file, err))?
            } else {
                assemble_file(&file)?
            };
            let outcome = run_program(&code, io::stdout().lock())?;
            if dump_state {
                eprintln!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
            }
            match outcome.fault {
                Some(fault) => Err(fault.into()),
                None => Ok(()),
            }
        }
        Command::Dis { bytecode } => {
            let code = fs::read(&bytecode).map_err(|err| PilotError::read(&bytecode, err))?;
            write_listing(&code, &mut io::stdout().lock())
        }
    }
}

pub fn assemble_file(path: &Path) -> Result<Vec<u8>, PilotError> {
    let source = fs::read_to_string(path).map_err(|err| PilotError::read(path, err))?;
    let code = assemble_source(&source)?;
    debug!(path = %path.display(), bytes = code.len(), "assembled");
    Ok(code)
}

/// Loads `code` into fresh memory and runs it, with machine output going to
/// `out`.
pub fn run_program<W: Write>(code: &[u8], out: W) -> Result<Outcome, PilotError> {
    let mut memory = Memory::new();
    memory.load_code(code)?;

    let mut console = Console::new(out);
    let mut cpu = Cpu::new();
    let result = cpu.execute(&mut memory, &mut console);
    if let Some(err) = console.take_error() {
        return Err(PilotError::Console(err));
    }
    console.flush().map_err(PilotError::Console)?;

    Ok(Outcome {
        snapshot: cpu.snapshot(),
        fault: result.err(),
    })
}

pub fn write_listing<W: Write>(code: &[u8], out: &mut W) -> Result<(), PilotError> {
    for line in disassemble(code)? {
        writeln!(out, "{:#06x}  {line}", line.address()).map_err(PilotError::Console)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("byte-pilot-{}-{name}", std::process::id()))
    }

    #[test]
    fn runs_and_captures_output() -> Result<(), PilotError> {
        let code = assemble_source("LOAD R0 42\nLOAD R1 10\nADD R0 R1\nPRINT R0\nHLT")?;
        let mut out = Vec::new();
        let outcome = run_program(&code, &mut out)?;
        assert_eq!(out, b"52\n");
        assert_eq!(outcome.snapshot.registers, [52, 10, 0, 0]);
        assert!(outcome.fault.is_none());
        Ok(())
    }

    #[test]
    fn countdown_demo() -> Result<(), PilotError> {
        let code = assemble_source(include_str!("../../../demos/countdown.asm"))?;
        let mut out = Vec::new();
        let outcome = run_program(&code, &mut out)?;
        assert_eq!(String::from_utf8_lossy(&out), "Hi!\n5\n4\n3\n2\n1\n0\n");
        assert_eq!(outcome.snapshot.stack_depth, 0);
        Ok(())
    }

    #[test]
    fn fault_still_yields_a_snapshot() -> Result<(), PilotError> {
        let code = assemble_source("PUSH 1\nDIV R0 0\nHLT")?;
        let outcome = run_program(&code, io::sink())?;
        assert_eq!(outcome.fault, Some(MachineFault::DivideByZero(2051)));
        assert_eq!(outcome.snapshot.stack_depth, 1);

        assert_eq!(PilotError::from(MachineFault::StackUnderflow).exit_status(), 2);
        Ok(())
    }

    #[test]
    fn snapshot_serializes_to_json() -> Result<(), PilotError> {
        let code = assemble_source("LOAD R3 7\nCMP R3 7\nHLT")?;
        let outcome = run_program(&code, io::sink())?;
        let json = serde_json::to_value(&outcome.snapshot)?;
        assert_eq!(json["registers"], serde_json::json!([0, 0, 0, 7]));
        assert_eq!(json["flags"], 1);
        assert_eq!(json["stack_depth"], 0);
        Ok(())
    }

    #[test]
    fn listing_shows_addresses() -> Result<(), PilotError> {
        let code = assemble_source("start:\nINC R0\nJMP start")?;
        let mut out = Vec::new();
        write_listing(&code, &mut out)?;
        assert_eq!(
            String::from_utf8_lossy(&out),
            "0x0800  INC R0\n0x0802  JMP 0x0800\n"
        );
        Ok(())
    }

    #[test]
    fn asm_command_writes_bytecode() -> Result<(), PilotError> {
        let source = scratch("ok.asm");
        let output = scratch("ok.bin");
        fs::write(&source, "LOAD R0 1\nHLT\n").map_err(|err| PilotError::write(&source, err))?;
        dispatch(Command::Asm {
            source: source.clone(),
            output: output.clone(),
        })?;
        let written = fs::read(&output).map_err(|err| PilotError::read(&output, err))?;
        assert_eq!(written, assemble_source("LOAD R0 1\nHLT")?);
        let _ = fs::remove_file(source);
        let _ = fs::remove_file(output);
        Ok(())
    }

    #[test]
    fn asm_command_writes_nothing_on_error() -> Result<(), PilotError> {
        let source = scratch("bad.asm");
        let output = scratch("bad.bin");
        fs::write(&source, "JMP nowhere\n").map_err(|err| PilotError::write(&source, err))?;
        let result = dispatch(Command::Asm {
            source: source.clone(),
            output: output.clone(),
        });
        assert!(matches!(result, Err(PilotError::Assemble(_))));
        assert_eq!(result.map_err(|err| err.exit_status()), Err(1));
        assert!(!output.exists());
        let _ = fs::remove_file(source);
        Ok(())
    }
}
