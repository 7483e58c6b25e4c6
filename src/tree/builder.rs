use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::frame_type::FrameType;
use crate::record::Record;

use super::processor::{self, Cursor, NewFrame};
use super::Frame;

/// Default number of worker threads used by parallel builds: the available parallelism.
pub static DEFAULT_NTHREADS: Lazy<usize> = Lazy::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
});

/// Settings that affect how records are turned into frame tree paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Root every stack at a synthetic node naming its thread.
    ///
    /// Default is `true`.
    pub thread_mode: bool,

    /// Keep line numbers and bytecode indices of frames.
    ///
    /// Default is `false`.
    pub parse_locations: bool,

    /// Collapse lambda and method-handle machinery into synthetic lambda frames.
    ///
    /// Default is `true`.
    pub lambda_frames: bool,

    /// Replace the leaf of allocation and blocking events with the allocated or blocked-on
    /// class.
    ///
    /// Default is `true`.
    pub top_frames: bool,

    /// Number of threads to use for parallel builds.
    ///
    /// Default is the number of logical cores on your machine.
    pub nthreads: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            thread_mode: true,
            parse_locations: false,
            lambda_frames: true,
            top_frames: true,
            nthreads: *DEFAULT_NTHREADS,
        }
    }
}

/// Merges records one by one into a frame tree.
///
/// ```
/// use frametree::frame_type::FrameType;
/// use frametree::record::{Record, StackFrame};
/// use frametree::tree::FrameTreeBuilder;
///
/// let record = Record::new(vec![
///     StackFrame::new("Main", "run", FrameType::JitCompiled),
///     StackFrame::new("Worker", "step", FrameType::Interpreted),
/// ]);
///
/// let mut builder = FrameTreeBuilder::default();
/// builder.on_record(&record)?;
/// let tree = builder.build();
///
/// assert_eq!(tree.total_samples(), 1);
/// assert_eq!(tree.path(&["Main#run", "Worker#step"]).unwrap().self_samples(), 1);
/// # Ok::<(), frametree::Error>(())
/// ```
#[derive(Debug)]
pub struct FrameTreeBuilder {
    opt: Options,
    root: Frame,
    path: Vec<NewFrame>,
    nrecords: usize,
    warned_missing_thread: bool,
}

impl From<Options> for FrameTreeBuilder {
    fn from(opt: Options) -> Self {
        Self {
            opt,
            root: Frame::root(),
            path: Vec::new(),
            nrecords: 0,
            warned_missing_thread: false,
        }
    }
}

impl Default for FrameTreeBuilder {
    fn default() -> Self {
        Options::default().into()
    }
}

impl FrameTreeBuilder {
    /// Builds a tree out of all `records`.
    pub fn from_records<'a, I>(opt: Options, records: I) -> Result<Frame>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut builder = FrameTreeBuilder::from(opt);
        for record in records {
            builder.on_record(record)?;
        }
        Ok(builder.build())
    }

    /// Adds a single record to the tree.
    ///
    /// A record without a stack is rejected, as is any record whose frames cannot be named or
    /// whose metrics would overflow the tree's counters. A rejected record leaves the tree
    /// unchanged.
    pub fn on_record(&mut self, record: &Record) -> Result<()> {
        let frames = match record.stack.as_deref() {
            Some(frames) if !frames.is_empty() => frames,
            _ => return Err(Error::MissingStack),
        };

        if self.opt.thread_mode && record.thread.is_none() && !self.warned_missing_thread {
            warn!("Record without thread information; it is not attributed to any thread");
            self.warned_missing_thread = true;
        }

        self.path.clear();
        let cursor = Cursor::new(record, frames, self.opt.thread_mode);
        processor::expand(&self.opt, cursor, &mut self.path)?;
        trace!(
            "Record with {} frames expanded into {}",
            frames.len(),
            self.path.len()
        );

        if !self.root.can_absorb(record.samples, record.weight) {
            return Err(Error::CounterOverflow);
        }
        self.root
            .increment(FrameType::Native, record.samples, record.weight, false);
        let mut node = &mut self.root;
        for frame in &self.path {
            node = node.add_frame(frame);
        }

        self.nrecords += 1;
        Ok(())
    }

    /// Number of records merged so far.
    pub fn records(&self) -> usize {
        self.nrecords
    }

    pub fn build(self) -> Frame {
        debug!(
            "Built frame tree from {} records: {} samples, depth {}",
            self.nrecords,
            self.root.total_samples(),
            self.root.depth(0)
        );
        self.root
    }
}
