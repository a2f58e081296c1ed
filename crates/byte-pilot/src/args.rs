use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Assemble, run and disassemble byte machine programs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `byte_machine=trace`
    #[arg(long, env = "BYTE_PILOT_LOG", default_value = "warn", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Assemble a source file into raw bytecode
    Asm {
        source: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Assemble (or load) a program and execute it
    Run {
        file: PathBuf,
        /// Treat FILE as raw bytecode instead of assembly source
        #[arg(long)]
        bytecode: bool,
        /// Print the final machine state as JSON on stderr
        #[arg(long)]
        dump_state: bool,
    },
    /// Print the disassembly of a bytecode file
    Dis { bytecode: PathBuf },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_asm() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["byte-pilot", "asm", "prog.asm", "-o", "prog.bin"])?;
        assert_eq!(
            cli.command,
            Command::Asm {
                source: PathBuf::from("prog.asm"),
                output: PathBuf::from("prog.bin"),
            }
        );
        Ok(())
    }

    #[test]
    fn parses_run_flags() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "byte-pilot",
            "--log",
            "debug",
            "run",
            "prog.bin",
            "--bytecode",
            "--dump-state",
        ])?;
        assert_eq!(cli.log, "debug");
        assert_eq!(
            cli.command,
            Command::Run {
                file: PathBuf::from("prog.bin"),
                bytecode: true,
                dump_state: true,
            }
        );
        Ok(())
    }

    #[test]
    fn run_defaults_to_source() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["byte-pilot", "run", "prog.asm"])?;
        assert!(matches!(
            cli.command,
            Command::Run {
                bytecode: false,
                dump_state: false,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn asm_requires_output() {
        assert!(Cli::try_parse_from(["byte-pilot", "asm", "prog.asm"]).is_err());
    }

    #[test]
    fn parses_dis() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["byte-pilot", "dis", "prog.bin"])?;
        assert_eq!(
            cli.command,
            Command::Dis {
                bytecode: PathBuf::from("prog.bin")
            }
        );
        Ok(())
    }
}
