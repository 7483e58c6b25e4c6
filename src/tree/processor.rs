use crate::error::{Error, Result};
use crate::frame_type::FrameType;
use crate::record::{Record, StackFrame};

use super::lambda::{is_lambda_infrastructure, LAMBDA_FRAME_LABEL};
use super::naming;
use super::Options;

/// Line number and bytecode index of frames without location information.
pub const NO_LOCATION: i32 = -1;

/// A frame about to be merged into the tree, produced from one or more raw stack positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFrame {
    pub label: String,
    pub line_number: i32,
    pub bytecode_index: i32,
    pub frame_type: FrameType,
    /// Set on the last frame of a record's path only.
    pub is_top_frame: bool,
    pub samples: u64,
    pub weight: u64,
}

/// Whether the synthetic thread root of the current record still has to be emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ThreadRoot {
    Pending,
    Emitted,
    /// Thread mode is off, or the record has no thread.
    Absent,
}

/// Position of the processor chain within a single record's stack.
#[derive(Debug)]
pub(crate) struct Cursor<'r> {
    record: &'r Record,
    frames: &'r [StackFrame],
    index: usize,
    thread_root: ThreadRoot,
}

impl<'r> Cursor<'r> {
    pub(crate) fn new(record: &'r Record, frames: &'r [StackFrame], thread_mode: bool) -> Self {
        let thread_root = if thread_mode && record.thread.is_some() {
            ThreadRoot::Pending
        } else {
            ThreadRoot::Absent
        };
        Cursor {
            record,
            frames,
            index: 0,
            thread_root,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.index >= self.frames.len()
    }

    fn is_at_leaf(&self) -> bool {
        self.index + 1 == self.frames.len()
    }

    fn current(&self) -> &'r StackFrame {
        &self.frames[self.index]
    }
}

/// The frame processors, in the order they are consulted at each stack position.
///
/// The first applicable processor handles the position. [`Processor::Normal`] applies
/// everywhere, so every position is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Processor {
    Thread,
    AllocationTopFrame,
    BlockingTopFrame,
    Lambda,
    Normal,
}

impl Processor {
    const CHAIN: [Processor; 4] = [
        Processor::Thread,
        Processor::AllocationTopFrame,
        Processor::BlockingTopFrame,
        Processor::Lambda,
    ];

    fn select(opt: &Options, cursor: &Cursor) -> Processor {
        Self::CHAIN
            .iter()
            .copied()
            .find(|p| p.is_applicable(opt, cursor))
            .unwrap_or(Processor::Normal)
    }

    fn is_applicable(self, opt: &Options, cursor: &Cursor) -> bool {
        match self {
            Processor::Thread => cursor.thread_root == ThreadRoot::Pending,
            Processor::AllocationTopFrame => {
                opt.top_frames && cursor.is_at_leaf() && cursor.record.kind.is_allocation()
            }
            Processor::BlockingTopFrame => {
                opt.top_frames && cursor.is_at_leaf() && cursor.record.kind.is_blocking()
            }
            Processor::Lambda => {
                opt.lambda_frames
                    && !cursor.is_exhausted()
                    && is_lambda_infrastructure(cursor.current())
            }
            Processor::Normal => true,
        }
    }

    /// Emits the frames for the cursor's position into `out` and advances the cursor past
    /// the raw frames it consumed.
    fn process(self, opt: &Options, cursor: &mut Cursor, out: &mut Vec<NewFrame>) -> Result<()> {
        let record = cursor.record;
        match self {
            Processor::Thread => {
                let thread = record.thread.as_ref();
                let frame = cursor.current();
                out.push(NewFrame {
                    label: naming::name(frame, thread, FrameType::ThreadNameSynthetic)?,
                    line_number: NO_LOCATION,
                    bytecode_index: NO_LOCATION,
                    frame_type: FrameType::ThreadNameSynthetic,
                    is_top_frame: false,
                    samples: record.samples,
                    weight: record.weight,
                });
                cursor.thread_root = ThreadRoot::Emitted;
            }
            Processor::AllocationTopFrame | Processor::BlockingTopFrame => {
                // top-frame processors only apply to kinds that have a top frame type
                let frame_type = record
                    .kind
                    .top_frame_type()
                    .unwrap_or(FrameType::AllocatedObjectSynthetic);
                let label = record
                    .weight_entity
                    .clone()
                    .ok_or(Error::MissingWeightEntity(record.kind))?;
                out.push(NewFrame {
                    label,
                    line_number: NO_LOCATION,
                    bytecode_index: NO_LOCATION,
                    frame_type,
                    is_top_frame: true,
                    samples: record.samples,
                    weight: record.weight,
                });
                cursor.index += 1;
            }
            Processor::Lambda => {
                while !cursor.is_exhausted() && is_lambda_infrastructure(cursor.current()) {
                    let (line_number, bytecode_index) = location(opt, cursor.current());
                    out.push(NewFrame {
                        label: LAMBDA_FRAME_LABEL.to_string(),
                        line_number,
                        bytecode_index,
                        frame_type: FrameType::LambdaSynthetic,
                        is_top_frame: cursor.is_at_leaf(),
                        samples: record.samples,
                        weight: record.weight,
                    });
                    cursor.index += 1;

                    // the leaf may still belong to a top-frame processor
                    if cursor.is_exhausted() || Processor::select(opt, cursor) != Processor::Lambda {
                        break;
                    }
                }
            }
            Processor::Normal => {
                let frame = cursor.current();
                let frame_type = frame.frame_type();
                let (line_number, bytecode_index) = location(opt, frame);
                out.push(NewFrame {
                    label: naming::name(frame, record.thread.as_ref(), frame_type)?,
                    line_number,
                    bytecode_index,
                    frame_type,
                    is_top_frame: cursor.is_at_leaf(),
                    samples: record.samples,
                    weight: record.weight,
                });
                cursor.index += 1;
            }
        }
        Ok(())
    }
}

fn location(opt: &Options, frame: &StackFrame) -> (i32, i32) {
    if opt.parse_locations {
        (frame.line_number, frame.bytecode_index)
    } else {
        (NO_LOCATION, NO_LOCATION)
    }
}

/// Runs the processor chain over a record's whole stack, appending the resulting path (root
/// side first) to `out`.
pub(crate) fn expand(opt: &Options, mut cursor: Cursor, out: &mut Vec<NewFrame>) -> Result<()> {
    while !cursor.is_exhausted() {
        let processor = Processor::select(opt, &cursor);
        trace!("{:?} at stack position {}", processor, cursor.index);
        processor.process(opt, &mut cursor, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventKind, ThreadInfo};

    fn jit(class: &str, method: &str) -> StackFrame {
        StackFrame::new(class, method, FrameType::JitCompiled)
    }

    fn run(opt: &Options, record: &Record) -> Result<Vec<NewFrame>> {
        let mut out = Vec::new();
        let frames = record.stack.as_deref().unwrap();
        expand(opt, Cursor::new(record, frames, opt.thread_mode), &mut out)?;
        Ok(out)
    }

    fn labels(frames: &[NewFrame]) -> Vec<&str> {
        frames.iter().map(|f| f.label.as_str()).collect()
    }

    #[test]
    fn thread_root_is_emitted_once_before_the_stack() {
        let record = Record::new(vec![jit("A", "a"), jit("B", "b")])
            .on_thread(ThreadInfo::new("worker", 5, 100))
            .with_metrics(2, 20);
        let path = run(&Options::default(), &record).unwrap();

        assert_eq!(labels(&path), ["worker (5)", "A#a", "B#b"]);
        assert_eq!(path[0].frame_type, FrameType::ThreadNameSynthetic);
        assert!(!path[0].is_top_frame);
        assert_eq!((path[0].samples, path[0].weight), (2, 20));
        assert!(!path[1].is_top_frame);
        assert!(path[2].is_top_frame);
    }

    #[test]
    fn thread_root_needs_thread_mode_and_a_thread() {
        let record = Record::new(vec![jit("A", "a")]);
        assert_eq!(labels(&run(&Options::default(), &record).unwrap()), ["A#a"]);

        let opt = Options {
            thread_mode: false,
            ..Options::default()
        };
        let record = record.on_thread(ThreadInfo::new("main", 1, 1));
        assert_eq!(labels(&run(&opt, &record).unwrap()), ["A#a"]);
    }

    #[test]
    fn allocation_replaces_the_leaf() {
        let record = Record::new(vec![jit("Main", "run"), jit("java.lang.StringBuilder", "toString")])
            .of_kind(EventKind::AllocationInNewRegion)
            .with_weight_entity("java.lang.String")
            .with_metrics(1, 16);
        let path = run(&Options::default(), &record).unwrap();

        assert_eq!(labels(&path), ["Main#run", "java.lang.String"]);
        let top = &path[1];
        assert_eq!(top.frame_type, FrameType::AllocatedObjectInNewRegionSynthetic);
        assert!(top.is_top_frame);
        assert_eq!((top.samples, top.weight), (1, 16));
        assert_eq!(top.line_number, NO_LOCATION);
    }

    #[test]
    fn allocation_kinds_pick_their_frame_type() {
        for (kind, expected) in [
            (EventKind::AllocationOutsideRegion, FrameType::AllocatedObjectOutsideRegionSynthetic),
            (EventKind::AllocationSample, FrameType::AllocatedObjectSynthetic),
            (EventKind::MonitorEnter, FrameType::BlockingObjectSynthetic),
            (EventKind::MonitorWait, FrameType::BlockingObjectSynthetic),
            (EventKind::ThreadPark, FrameType::BlockingObjectSynthetic),
        ] {
            let record = Record::new(vec![jit("A", "a")])
                .of_kind(kind)
                .with_weight_entity("java.lang.Object");
            let path = run(&Options::default(), &record).unwrap();
            assert_eq!(path.len(), 1);
            assert_eq!(path[0].frame_type, expected, "{:?}", kind);
        }
    }

    #[test]
    fn top_frames_can_be_disabled() {
        let opt = Options {
            top_frames: false,
            ..Options::default()
        };
        let record = Record::new(vec![jit("A", "a")])
            .of_kind(EventKind::ThreadPark)
            .with_weight_entity("java.util.concurrent.locks.ReentrantLock");
        assert_eq!(labels(&run(&opt, &record).unwrap()), ["A#a"]);
    }

    #[test]
    fn missing_weight_entity_is_fatal() {
        let record = Record::new(vec![jit("A", "a")]).of_kind(EventKind::MonitorEnter);
        assert!(matches!(
            run(&Options::default(), &record),
            Err(Error::MissingWeightEntity(EventKind::MonitorEnter))
        ));
    }

    #[test]
    fn lambda_runs_are_renamed_frame_by_frame() {
        let record = Record::new(vec![
            jit("Main", "run"),
            jit("java.lang.invoke.LambdaForm$MH", "invoke"),
            jit("java.lang.invoke.DirectMethodHandle$Holder", "invokeStatic"),
            jit("com.example.Main", "lambda$run$0"),
            jit("Pipeline", "map"),
        ]);
        let path = run(&Options::default(), &record).unwrap();

        assert_eq!(
            labels(&path),
            [
                "Main#run",
                LAMBDA_FRAME_LABEL,
                LAMBDA_FRAME_LABEL,
                LAMBDA_FRAME_LABEL,
                "Pipeline#map"
            ]
        );
        assert!(path[1..4]
            .iter()
            .all(|f| f.frame_type == FrameType::LambdaSynthetic && !f.is_top_frame));
    }

    #[test]
    fn lambda_leaf_is_the_top_frame() {
        let record = Record::new(vec![jit("Main", "run"), jit("Foo$$Lambda$1", "apply")]);
        let path = run(&Options::default(), &record).unwrap();
        assert_eq!(path[1].label, LAMBDA_FRAME_LABEL);
        assert!(path[1].is_top_frame);
    }

    #[test]
    fn lambda_only_stack_is_a_single_leaf() {
        let record = Record::new(vec![jit("Foo$$Lambda$1", "apply")]).with_metrics(3, 30);

        let opt = Options {
            thread_mode: false,
            ..Options::default()
        };
        let path = run(&opt, &record).unwrap();
        assert_eq!(labels(&path), [LAMBDA_FRAME_LABEL]);
        assert!(path[0].is_top_frame);
        assert_eq!((path[0].samples, path[0].weight), (3, 30));

        let record = record.on_thread(ThreadInfo::new("worker", 5, 100));
        let path = run(&Options::default(), &record).unwrap();
        assert_eq!(labels(&path), ["worker (5)", LAMBDA_FRAME_LABEL]);
        assert!(!path[0].is_top_frame);
        assert!(path[1].is_top_frame);
    }

    #[test]
    fn lambda_is_not_applicable_past_the_stack() {
        let record = Record::new(vec![jit("Foo$$Lambda$1", "apply")]);
        let frames = record.stack.as_deref().unwrap();
        let mut cursor = Cursor::new(&record, frames, false);
        cursor.index = 1;
        assert!(!Processor::Lambda.is_applicable(&Options::default(), &cursor));
    }

    #[test]
    fn allocation_wins_over_lambda_at_the_leaf() {
        let record = Record::new(vec![
            jit("Main", "run"),
            jit("Foo$$Lambda$1", "apply"),
            jit("Bar$$Lambda$2", "get"),
        ])
        .of_kind(EventKind::AllocationSample)
        .with_weight_entity("byte[]");
        let path = run(&Options::default(), &record).unwrap();
        assert_eq!(labels(&path), ["Main#run", LAMBDA_FRAME_LABEL, "byte[]"]);
    }

    #[test]
    fn lambda_handling_can_be_disabled() {
        let opt = Options {
            lambda_frames: false,
            ..Options::default()
        };
        let record = Record::new(vec![jit("Foo$$Lambda$1", "apply")]);
        assert_eq!(labels(&run(&opt, &record).unwrap()), ["Foo$$Lambda$1#apply"]);
    }

    #[test]
    fn locations_only_when_parsing_is_enabled() {
        let record = Record::new(vec![jit("A", "a").at(42, 7)]);
        let path = run(&Options::default(), &record).unwrap();
        assert_eq!((path[0].line_number, path[0].bytecode_index), (NO_LOCATION, NO_LOCATION));

        let opt = Options {
            parse_locations: true,
            ..Options::default()
        };
        let path = run(&opt, &record).unwrap();
        assert_eq!((path[0].line_number, path[0].bytecode_index), (42, 7));
    }

    #[test]
    fn unknown_frames_abort() {
        let mut frame = jit("A", "a");
        frame.type_code = "Mystery".to_string();
        let record = Record::new(vec![jit("Main", "run"), frame]);
        assert!(matches!(
            run(&Options::default(), &record),
            Err(Error::UnknownFrameType { .. })
        ));
    }
}
