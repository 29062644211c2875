use clap::Args;
use quill::ProgramFile;
use std::path::PathBuf;
use std::process::exit;

#[derive(Args)]
pub struct InspectArgs {
    #[arg(help = "Program file (JSON)")]
    main: PathBuf,
}

pub(crate) fn inspect(args: InspectArgs) {
    match ProgramFile::read(&args.main).and_then(|f| f.compile()) {
        Ok(file) => print!("{}", file.disassemble()),
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.main.display());
            exit(1)
        }
    }
}
