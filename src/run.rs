use clap::Args;
use quill::{parse_arg, ProgramFile, VMOptions, VM};
use quill_vm::VMIo;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

#[derive(Args)]
pub struct RunArgs {
    #[arg(help = "Program file (JSON)")]
    main: PathBuf,
    #[arg(short, long, default_value = "false", help = "Show output from eval")]
    show_output: bool,
    #[arg(short, long, env = "QUILL_WORKERS", help = "Worker threads, defaults to available cores")]
    workers: Option<usize>,
    #[arg(short, long, help = "Significant digits kept by arithmetic")]
    precision: Option<u32>,
    #[arg(long, help = "Give up on asynchronous programs after this many milliseconds")]
    timeout_ms: Option<u64>,
    #[arg(help = "Arguments for main, parsed as JSON when possible")]
    args: Vec<String>,
}

pub(crate) fn run(args: RunArgs) {
    let file = match ProgramFile::read(&args.main).and_then(|f| f.compile()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.main.display());
            exit(1)
        }
    };

    let defaults = VMOptions::default();
    let options = VMOptions {
        workers: args.workers.unwrap_or(defaults.workers),
        precision: args.precision,
        timeout: args.timeout_ms.map(Duration::from_millis),
        ..defaults
    };
    let vm = match VM::create(options) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("VM Start Failed: {e}");
            exit(1)
        }
    };

    let program_args = args.args.iter().map(|a| parse_arg(a)).collect();
    match file.run(&vm, VMIo::default(), program_args) {
        Err(e) if e.is_abort() => {}
        Err(e) => {
            eprintln!("VM Run Failed: {e}");
            exit(1)
        }
        Ok(v) if args.show_output => {
            println!("{v}")
        }
        Ok(_) => {}
    }
}
