//! Lum CLI: parse Lum source into lumps and execute programs.

use clap::Parser as ClapParser;
use std::fs;
use std::path::{Path, PathBuf};

use lum::diagnostics::Diagnostics;
use lum::{lumper, parse_source, Executor, LumResult};

#[derive(ClapParser, Debug)]
#[command(name = "lum")]
#[command(version = lum::VERSION)]
#[command(about = "The Lum language toolchain", long_about = None)]
struct Args {
    /// Parse the input and write a .lmp lump alongside it
    #[arg(long)]
    lmp: bool,

    /// Load and execute the input (.lum or .lmp)
    #[arg(long)]
    run: bool,

    /// Input file
    input: PathBuf,
}

fn main() {
    // Deep Lum programs recurse through the executor; give the interpreter
    // thread room.
    let builder = std::thread::Builder::new()
        .name("interpreter".into())
        .stack_size(8 * 1024 * 1024);

    let handle = builder
        .spawn(|| {
            let args = Args::parse();
            run_command(args)
        })
        .expect("Failed to spawn interpreter thread");

    std::process::exit(handle.join().unwrap_or(1));
}

fn run_command(args: Args) -> i32 {
    if !args.lmp && !args.run {
        eprintln!("Nothing to do: pass --lmp and/or --run. See --help.");
        return 1;
    }

    let path = &args.input;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let name = path.to_string_lossy().to_string();

    match ext {
        "lum" => {
            let source = match fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Failed to read {}: {e}", path.display());
                    return 1;
                }
            };
            match lump_and_run(&source, path, args.run) {
                Ok(()) => 0,
                Err(e) => {
                    eprint!("{}", Diagnostics::new(&source, &name).format_error(&e));
                    1
                }
            }
        }
        "lmp" if args.run && !args.lmp => match run_lump_file(path) {
            Ok(()) => 0,
            Err(e) => {
                eprint!("{}", Diagnostics::new("", &name).format_error(&e));
                1
            }
        },
        _ => {
            eprintln!("Invalid file extension. Expected .lum or .lmp.");
            1
        }
    }
}

/// Parse, write the lump cache, and (for `--run`) execute the decoded lump
/// so every run exercises the codec.
fn lump_and_run(source: &str, path: &Path, run: bool) -> LumResult<()> {
    let program = parse_source(source, &path.to_string_lossy())?;
    let lump_path = path.with_extension("lmp");
    lumper::lump_to_file(&program, &lump_path)?;

    if run {
        let decoded = lumper::unlump_file(&lump_path)?;
        Executor::new(decoded).run()?;
    }
    Ok(())
}

fn run_lump_file(path: &Path) -> LumResult<()> {
    let program = lumper::unlump_file(path)?;
    Executor::new(program).run()?;
    Ok(())
}
