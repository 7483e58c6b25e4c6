use std::io::{self, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use env_logger::Env;
use frametree::flamegraph::{self, FlamegraphData, WeightFormat};
use frametree::record::{self, Record};
use frametree::tree::{self, Frame, FrameTreeBuilder, Options};
use frametree::{collapse, Result};
use is_terminal::IsTerminal;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Folded stack lines
    Folded,
    /// The whole tree as JSON
    Json,
    /// Flame graph levels as JSON
    Levels,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Weight {
    /// Bytes allocated
    Allocation,
    /// Nanoseconds blocked
    Blocking,
    /// Nanoseconds of latency
    Latency,
}

impl From<Weight> for WeightFormat {
    fn from(weight: Weight) -> Self {
        match weight {
            Weight::Allocation => WeightFormat::Allocation,
            Weight::Blocking => WeightFormat::Blocking,
            Weight::Latency => WeightFormat::Latency,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(
    name = "frametree-build",
    about,
    after_help = "\
[1] Records are JSON objects, one per line, e.g.
        {\"stack\":[{\"className\":\"App\",\"methodName\":\"main\",\"type\":\"JIT compiled\"}],
         \"thread\":{\"osThreadId\":7,\"javaThreadId\":1,\"name\":\"main\"},
         \"kind\":\"execution_sample\",\"samples\":1,\"weight\":0}
    (shown wrapped here)."
)]
struct Opt {
    // ************* //
    // *** FLAGS *** //
    // ************* //
    /// Do not root stacks at their thread
    #[clap(long = "threads-off")]
    threads_off: bool,

    /// Keep line numbers and bytecode indices
    #[clap(long = "locations")]
    locations: bool,

    /// Keep lambda and method-handle frames as they are
    #[clap(long = "no-lambda")]
    no_lambda: bool,

    /// Keep the leaf frame of allocation and blocking events
    #[clap(long = "no-top-frames")]
    no_top_frames: bool,

    /// Silence all log output
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    // *************** //
    // *** OPTIONS *** //
    // *************** //
    /// Output format
    #[clap(long = "format", value_enum, default_value = "folded")]
    format: Format,

    /// Count weight instead of samples, formatted as the given kind
    #[clap(long = "weight", value_enum, value_name = "KIND")]
    weight: Option<Weight>,

    /// Number of records per job sent to the worker threads (only used if nthreads > 1)
    #[clap(long = "chunk-size", default_value = "1024", value_name = "UINT")]
    chunk_size: usize,

    /// Number of threads to use [default: number of logical cores on your machine]
    #[clap(short = 'n', long = "nthreads", value_name = "UINT")]
    nthreads: Option<usize>,

    // ************ //
    // *** ARGS *** //
    // ************ //
    /// JSON-lines recording, or STDIN if not specified
    #[clap(value_name = "PATH")]
    infile: Option<PathBuf>,
}

impl Opt {
    fn into_parts(self) -> (Option<PathBuf>, Options, Output) {
        let options = Options {
            thread_mode: !self.threads_off,
            parse_locations: self.locations,
            lambda_frames: !self.no_lambda,
            top_frames: !self.no_top_frames,
            nthreads: self.nthreads.unwrap_or(*tree::DEFAULT_NTHREADS).max(1),
        };
        let output = Output {
            format: self.format,
            weight: self.weight,
            chunk_size: self.chunk_size.max(1),
        };
        (self.infile, options, output)
    }
}

struct Output {
    format: Format,
    weight: Option<Weight>,
    chunk_size: usize,
}

#[cfg(feature = "multithreaded")]
fn build(options: Options, records: &[Record], chunk_size: usize) -> Result<Frame> {
    if options.nthreads > 1 {
        let chunks: Vec<_> = records.chunks(chunk_size).collect();
        tree::parallel::build_chunks(&options, &chunks)
    } else {
        FrameTreeBuilder::from_records(options, records)
    }
}

#[cfg(not(feature = "multithreaded"))]
fn build(options: Options, records: &[Record], _chunk_size: usize) -> Result<Frame> {
    FrameTreeBuilder::from_records(options, records)
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

    let (infile, options, output) = opt.into_parts();
    if infile.is_none() && io::stdin().is_terminal() {
        log::info!("Reading records from STDIN; end input with Ctrl-D");
    }

    let records = record::read_file(infile.as_ref())?;
    let tree = build(options, &records, output.chunk_size)?;

    let stdout = io::stdout();
    let mut writer = io::BufWriter::new(stdout.lock());
    match output.format {
        Format::Folded => {
            let opt = collapse::Options {
                weight: output.weight.is_some(),
            };
            collapse::write_folded(&tree, &opt, &mut writer)?;
        }
        Format::Json => {
            serde_json::to_writer(&mut writer, &tree).map_err(io::Error::from)?;
            writeln!(writer)?;
        }
        Format::Levels => {
            let opt = flamegraph::Options {
                weight: output.weight.map(WeightFormat::from),
            };
            let data = FlamegraphData::from_frame(&tree, &opt);
            serde_json::to_writer(&mut writer, &data).map_err(io::Error::from)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}
