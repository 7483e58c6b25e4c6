use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame_type::FrameType;

const READER_CAPACITY: usize = 128 * 1024;

/// One entry of a recorded call stack, as produced by the recording parser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Fully qualified class name. Empty for native, C++ and kernel frames.
    #[serde(default)]
    pub class_name: String,
    pub method_name: String,
    #[serde(default)]
    pub line_number: i32,
    #[serde(default)]
    pub bytecode_index: i32,
    /// Frame-type code as found in the recording, e.g. `"JIT compiled"`.
    #[serde(rename = "type")]
    pub type_code: String,
}

impl StackFrame {
    /// Creates a frame without location information.
    pub fn new<C, M>(class_name: C, method_name: M, frame_type: FrameType) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        StackFrame {
            class_name: class_name.into(),
            method_name: method_name.into(),
            line_number: 0,
            bytecode_index: 0,
            type_code: code_of(frame_type).to_string(),
        }
    }

    /// Sets the line number and bytecode index.
    pub fn at(mut self, line_number: i32, bytecode_index: i32) -> Self {
        self.line_number = line_number;
        self.bytecode_index = bytecode_index;
        self
    }

    /// Classifies the frame by its type code.
    pub fn frame_type(&self) -> FrameType {
        FrameType::from_code(&self.type_code)
    }
}

fn code_of(frame_type: FrameType) -> &'static str {
    match frame_type {
        FrameType::JitCompiled => "JIT compiled",
        FrameType::C1Compiled => "C1 compiled",
        other => other.title(),
    }
}

/// The thread a record was sampled on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    pub os_thread_id: i64,
    /// Non-positive for threads the JVM does not know as Java threads (GC, compiler, ...).
    pub java_thread_id: i64,
    pub name: String,
    #[serde(default)]
    pub is_virtual: bool,
}

impl ThreadInfo {
    pub fn new<N: Into<String>>(name: N, java_thread_id: i64, os_thread_id: i64) -> Self {
        ThreadInfo {
            os_thread_id,
            java_thread_id,
            name: name.into(),
            is_virtual: false,
        }
    }

    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }
}

/// The kind of event a record was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExecutionSample,
    WallClockSample,
    NativeMethodSample,
    /// Allocation that required a new thread-local allocation region.
    AllocationInNewRegion,
    /// Allocation served directly from the shared heap.
    AllocationOutsideRegion,
    /// Throttled allocation sample without region information.
    AllocationSample,
    MonitorEnter,
    MonitorWait,
    ThreadPark,
}

impl EventKind {
    /// The synthetic frame type substituted for the leaf frame of this kind of event, if any.
    pub fn top_frame_type(self) -> Option<FrameType> {
        match self {
            EventKind::AllocationInNewRegion => Some(FrameType::AllocatedObjectInNewRegionSynthetic),
            EventKind::AllocationOutsideRegion => {
                Some(FrameType::AllocatedObjectOutsideRegionSynthetic)
            }
            EventKind::AllocationSample => Some(FrameType::AllocatedObjectSynthetic),
            EventKind::MonitorEnter | EventKind::MonitorWait | EventKind::ThreadPark => {
                Some(FrameType::BlockingObjectSynthetic)
            }
            EventKind::ExecutionSample
            | EventKind::WallClockSample
            | EventKind::NativeMethodSample => None,
        }
    }

    pub fn is_allocation(self) -> bool {
        self.top_frame_type().map_or(false, FrameType::is_allocation)
    }

    pub fn is_blocking(self) -> bool {
        self.top_frame_type() == Some(FrameType::BlockingObjectSynthetic)
    }
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::ExecutionSample
    }
}

fn one() -> u64 {
    1
}

/// A single sampled stack with its metrics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Outermost caller first, sampled leaf last.
    #[serde(default)]
    pub stack: Option<Vec<StackFrame>>,
    #[serde(default)]
    pub thread: Option<ThreadInfo>,
    #[serde(default)]
    pub kind: EventKind,
    /// Allocated or blocked-on class, for allocation and blocking events.
    #[serde(default)]
    pub weight_entity: Option<String>,
    #[serde(default = "one")]
    pub samples: u64,
    /// Time, bytes, ... depending on `kind`.
    #[serde(default)]
    pub weight: u64,
}

impl Record {
    /// An execution sample of the given stack with one sample and no weight.
    pub fn new(stack: Vec<StackFrame>) -> Self {
        Record {
            stack: Some(stack),
            thread: None,
            kind: EventKind::ExecutionSample,
            weight_entity: None,
            samples: 1,
            weight: 0,
        }
    }

    pub fn on_thread(mut self, thread: ThreadInfo) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn of_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_weight_entity<E: Into<String>>(mut self, entity: E) -> Self {
        self.weight_entity = Some(entity.into());
        self
    }

    pub fn with_metrics(mut self, samples: u64, weight: u64) -> Self {
        self.samples = samples;
        self.weight = weight;
        self
    }
}

/// Reads JSON-encoded records, one per line.
///
/// Blank lines are skipped. The first line that fails to decode aborts reading.
pub fn read_records<R: BufRead>(mut reader: R) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut line = String::new();
    let mut line_num = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_num += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|source| Error::Json {
            line: line_num,
            source,
        })?;
        records.push(record);
    }
    debug!("Read {} records from {} lines", records.len(), line_num);
    Ok(records)
}

/// Reads JSON-encoded records from a file, or from STDIN if `infile` is `None`.
pub fn read_file<P: AsRef<Path>>(infile: Option<P>) -> Result<Vec<Record>> {
    match infile {
        Some(ref path) => {
            let file = File::open(path)?;
            read_records(io::BufReader::with_capacity(READER_CAPACITY, file))
        }
        None => {
            let stdin = io::stdin();
            let reader = io::BufReader::with_capacity(READER_CAPACITY, stdin.lock());
            read_records(reader)
        }
    }
}
