//! Standalone preprocessor entry point: preprocess one file and write the
//! resulting token stream to standard output.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cpre_preprocessor::Preprocessor;
use tracing::{error, metadata::LevelFilter};
use tracing_subscriber::{prelude::*, EnvFilter};

/// The default system search directories; a configuration default, not
/// something the core knows about.
const DEFAULT_SEARCH_DIRS: &[&str] = &[
    "/usr/include",
    "/usr/include/x86_64-linux-gnu",
    "/usr/local/include",
];

#[derive(Debug, Parser)]
pub struct Args {
    /// C source file to preprocess.
    file: PathBuf,

    /// Additional directories to search for <...> headers, in order, before
    /// the system default directories.
    #[clap(short = 'I', long = "include-dir")]
    include: Vec<PathBuf>,

    /// Do not search the system default include directories.
    #[clap(long)]
    no_default_includes: bool,
}

pub fn fallible_main(args: Args) -> anyhow::Result<()> {
    let mut preprocessor = Preprocessor::new();
    for dir in &args.include {
        preprocessor.add_search_dir(dir);
    }
    if !args.no_default_includes {
        for dir in DEFAULT_SEARCH_DIRS {
            preprocessor.add_search_dir(dir);
        }
    }
    preprocessor.push_file(&args.file)?;

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    while let Some(token) = preprocessor.next()? {
        write!(out, "{token}").context("cannot write to standard output")?;
    }
    // A newline after the last token keeps the output a text file.
    writeln!(out).context("cannot write to standard output")?;
    out.flush().context("cannot write to standard output")?;
    Ok(())
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        );
    tracing::subscriber::set_global_default(subscriber)
        .expect("cannot set default tracing subscriber");

    let args = Args::parse();

    match fallible_main(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
