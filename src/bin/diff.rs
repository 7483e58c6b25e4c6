use std::io::{self, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use env_logger::Env;
use frametree::differential::{self, Options};
use frametree::record;
use frametree::tree::{self, FrameTreeBuilder};
use frametree::Result;

#[derive(Debug, Parser)]
#[clap(name = "frametree-diff", about)]
struct Opt {
    /// Normalize the secondary recording's counts to the primary's totals
    #[clap(long = "normalize")]
    normalize: bool,

    /// Do not root stacks at their thread
    #[clap(long = "threads-off")]
    threads_off: bool,

    /// Silence all log output
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Primary JSON-lines recording
    primary: PathBuf,

    /// Secondary JSON-lines recording
    secondary: PathBuf,
}

impl Opt {
    fn into_parts(self) -> (PathBuf, PathBuf, tree::Options, Options) {
        let tree_options = tree::Options {
            thread_mode: !self.threads_off,
            ..tree::Options::default()
        };
        (
            self.primary,
            self.secondary,
            tree_options,
            Options {
                normalize: self.normalize,
            },
        )
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let (primary, secondary, tree_options, options) = opt.into_parts();
    let primary = record::read_file(Some(primary))?;
    let primary = FrameTreeBuilder::from_records(tree_options.clone(), &primary)?;
    let secondary = record::read_file(Some(secondary))?;
    let secondary = FrameTreeBuilder::from_records(tree_options, &secondary)?;

    let diff = differential::generate(&primary, &secondary, &options);

    let stdout = io::stdout();
    let mut writer = io::BufWriter::new(stdout.lock());
    serde_json::to_writer(&mut writer, &diff).map_err(io::Error::from)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
