use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use auto_decorator::{ArtifactSink, CancellationToken, DirSink, Error, Generator};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Generate forwarding trait methods for `#[decorator]` structs.
#[derive(Parser, Debug)]
#[command(name = "auto-decorator", version)]
struct Args {
    /// Rust source files to scan.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory to write artifacts to. Artifacts go to stdout when omitted.
    #[arg(short, long, env = "AUTO_DECORATOR_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Module path the files are mounted at.
    #[arg(short, long, default_value = "crate")]
    module: String,

    /// Fully qualified path of the marker attribute.
    #[arg(long, default_value = auto_decorator::pipeline::MARKER_PATH)]
    marker: String,

    /// Also emit each source with the generated methods merged in.
    #[arg(long)]
    merge: bool,

    /// Process candidates in parallel.
    #[arg(long)]
    parallel: bool,
}

struct StdoutSink;

impl ArtifactSink for StdoutSink {
    fn add_artifact(&mut self, name: &str, content: &str) -> auto_decorator::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "// ==> {name} <==")
            .and_then(|_| writeln!(stdout, "{content}"))
            .map_err(|e| Error::Io {
                path: PathBuf::from("<stdout>"),
                source: e,
            })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("AUTO_DECORATOR_LOG"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let generator = args
        .files
        .iter()
        .fold(Generator::new(), |generator, file| generator.file_in(file, &args.module))
        .marker(&args.marker)
        .merge(args.merge)
        .parallel(args.parallel);

    let cancel = CancellationToken::new();
    let result = match &args.out_dir {
        Some(dir) => generator.run(&mut DirSink::new(dir), &cancel),
        None => generator.run(&mut StdoutSink, &cancel),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
