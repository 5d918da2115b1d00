use std::{
    fs,
    path::{Path, PathBuf},
};

use asm6x09_core::{
    AssembleOptions, Assembly, Cpu, DEFAULT_LABEL_PROXIMITY, assemble_path,
    diag::{Diag, Severity, count_severity, render_diags},
    listing::render_listing,
    rom::{RomError, load_reference, split, verify},
    source::SourceManager,
};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, error, info, warn};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_IO: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "asm6x09")]
#[command(about = "Cross-assembler for the Motorola 6800/6809 and Hitachi 6309")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(long, global = true, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a source file into a ROM image
    Assemble(AssembleArgs),
    /// Assemble and report diagnostics without writing anything
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct AsmFlags {
    /// Overrides `.cpu` directives: 6800, 6809 or 6309
    #[arg(long, value_parser = parse_cpu)]
    cpu: Option<Cpu>,

    /// Treat NAME as defined for `#ifdef` (repeatable)
    #[arg(short = 'D', long = "define", value_name = "NAME")]
    defines: Vec<String>,

    /// Warn about same-named labels closer than this many bytes; 0 disables
    #[arg(long, default_value_t = DEFAULT_LABEL_PROXIMITY)]
    label_proximity: u32,
}

impl AsmFlags {
    fn options(&self) -> AssembleOptions {
        AssembleOptions {
            cpu: self.cpu,
            defines: self.defines.clone(),
            label_proximity: self.label_proximity,
        }
    }
}

#[derive(Args, Debug)]
struct AssembleArgs {
    input: PathBuf,

    /// ROM image path (default: INPUT with a `.bin` extension)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Write each `.rom` slice to DIR/<filename>.out
    #[arg(long, value_name = "DIR")]
    split: Option<PathBuf>,

    /// Write an address/bytes/source listing
    #[arg(long, value_name = "FILE")]
    listing: Option<PathBuf>,

    /// Compare against the reference ROM files named by `.rom` in DIR
    #[arg(long, value_name = "DIR")]
    reference: Option<PathBuf>,

    /// Mismatching lines reported individually during comparison
    #[arg(long, default_value_t = 20)]
    max_mismatches: usize,

    #[command(flatten)]
    flags: AsmFlags,
}

#[derive(Args, Debug)]
struct CheckArgs {
    input: PathBuf,

    #[command(flatten)]
    flags: AsmFlags,
}

fn parse_cpu(name: &str) -> Result<Cpu, String> {
    Cpu::from_name(name).ok_or_else(|| format!("unknown CPU `{name}`; expected 6800, 6809 or 6309"))
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Assemble(args) => run_assemble(args),
        Commands::Check(args) => run_check(args),
    };

    std::process::exit(exit_code);
}

fn run_assemble(args: AssembleArgs) -> i32 {
    let (sources, assembly) = match load_and_assemble(&args.input, &args.flags) {
        Ok(done) => done,
        Err(code) => return code,
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("bin"));
    if let Err(err) = fs::write(&output, assembly.rom.bytes()) {
        error!("cannot write {}: {err}", output.display());
        return EXIT_IO;
    }
    info!(path = %output.display(), bytes = assembly.rom.len(), "rom image written");

    if let Some(path) = &args.listing {
        if let Err(err) = fs::write(path, render_listing(&sources, &assembly)) {
            error!("cannot write {}: {err}", path.display());
            return EXIT_IO;
        }
    }

    if let Some(dir) = &args.split {
        if assembly.roms.is_empty() {
            warn!("no `.rom` directives; nothing to split");
        }
        if let Err(err) = split(&assembly.rom, &assembly.roms, dir) {
            error!("{err}");
            return EXIT_IO;
        }
    }

    if let Some(dir) = &args.reference {
        let reference = match load_reference(dir, &assembly.roms) {
            Ok(reference) => reference,
            Err(err @ RomError::ChecksumMismatch { .. }) => {
                error!("{err}");
                return EXIT_FAILURE;
            }
            Err(err) => {
                error!("{err}");
                return EXIT_IO;
            }
        };
        let result = verify(&assembly.rom, &assembly.lines, &reference, args.max_mismatches);
        report(&sources, &result.diags);
        if !result.is_clean() {
            return EXIT_FAILURE;
        }
        info!("rom image matches the reference");
    }

    EXIT_OK
}

fn run_check(args: CheckArgs) -> i32 {
    match load_and_assemble(&args.input, &args.flags) {
        Ok(_) => EXIT_OK,
        Err(code) => code,
    }
}

/// Assembles `input` and prints its diagnostics; `Err` carries the exit code.
fn load_and_assemble(input: &Path, flags: &AsmFlags) -> Result<(SourceManager, Assembly), i32> {
    if let Err(err) = fs::metadata(input) {
        error!("cannot read {}: {err}", input.display());
        return Err(EXIT_IO);
    }

    let (sources, result) = assemble_path(input, &flags.options());
    match result {
        Ok(assembly) => {
            report(&sources, &assembly.diags);
            Ok((sources, assembly))
        }
        Err(diags) => {
            report(&sources, &diags);
            Err(EXIT_FAILURE)
        }
    }
}

fn report(sources: &SourceManager, diags: &[Diag]) {
    if let Err(err) = render_diags(sources, diags) {
        error!("cannot print diagnostics: {err}");
    }
    info!(
        errors = count_severity(diags, Severity::Error),
        warnings = count_severity(diags, Severity::Warning),
        "diagnostics reported"
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{Cli, Commands};
    use asm6x09_core::Cpu;
    use clap::Parser;
    use tracing::Level;

    #[test]
    fn parses_assemble_command() {
        let cli = Cli::parse_from([
            "asm6x09",
            "assemble",
            "game.asm",
            "-o",
            "game.bin",
            "--split",
            "out",
            "--reference",
            "roms",
            "--cpu",
            "6309",
            "-D",
            "DEBUG",
            "-D",
            "PAL",
            "--label-proximity",
            "0",
        ]);

        let Commands::Assemble(args) = cli.command else {
            panic!("expected assemble");
        };
        assert_eq!(args.output, Some(PathBuf::from("game.bin")));
        assert_eq!(args.split, Some(PathBuf::from("out")));
        assert_eq!(args.max_mismatches, 20);
        let opts = args.flags.options();
        assert_eq!(opts.cpu, Some(Cpu::M6809 { hd6309: true }));
        assert_eq!(opts.defines, vec!["DEBUG", "PAL"]);
        assert_eq!(opts.label_proximity, 0);
        assert_eq!(cli.log_level, Level::WARN);
    }

    #[test]
    fn parses_check_command_with_defaults() {
        let cli = Cli::parse_from(["asm6x09", "--log-level", "debug", "check", "game.asm"]);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        let opts = args.flags.options();
        assert_eq!(opts.cpu, None);
        assert_eq!(opts.label_proximity, 512);
        assert_eq!(cli.log_level, Level::DEBUG);
    }

    #[test]
    fn rejects_unknown_cpus() {
        let parsed = Cli::try_parse_from(["asm6x09", "check", "game.asm", "--cpu", "6502"]);
        assert!(parsed.is_err());
    }
}
