//! Frametree aggregates sampled JVM call stacks into a frame tree: a prefix tree of frames in
//! which every node counts how many samples (and how much weight, such as allocated bytes or
//! blocked nanoseconds) passed through it, and how many ended in it. The tree is what flame
//! graphs, differential flame graphs and hot-path views are drawn from.
//!
//! Like a flame graph pipeline, frametree works in stages. Sampled stacks arrive as
//! [`record::Record`]s, usually read from JSON lines with [`record::read_records`]. A
//! [`tree::FrameTreeBuilder`] merges them into a [`tree::Frame`], and the tree is then written out
//! as folded stacks ([`collapse`]), as level-ordered flame graph data ([`flamegraph`]), or compared
//! against another tree ([`differential`]).
//!
//! # Building a tree
//!
//! Every record's stack is run through a chain of frame processors before it is merged:
//!
//!  - in thread mode, a synthetic root naming the sampled thread, such as `main (1)`, is put in
//!    front of the stack;
//!  - for allocation and blocking events, the leaf frame is replaced by the allocated or
//!    blocked-on class;
//!  - frames of the JVM's lambda and method-handle machinery (`$$Lambda` classes, `LambdaForm$`
//!    and `DirectMethodHandle$Holder` frames, `lambda$` bodies) are relabelled as
//!    `Lambda Frame (Synthetic)`, so that trees of the same code line up across JVM runs;
//!  - all other frames are labelled `Class#method` (Java) or by their function name (native,
//!    C++ and kernel code).
//!
//! The resulting path is merged from the root down. Each node keeps per-tier sample counters
//! (interpreted, C1, JIT, inlined, native, C++, kernel), from which [`tree::Frame::frame_type`]
//! decides the node's dominant [`frame_type::FrameType`].
//!
//! ```
//! use frametree::frame_type::FrameType;
//! use frametree::record::{Record, StackFrame, ThreadInfo};
//! use frametree::tree::{FrameTreeBuilder, Options};
//!
//! let record = Record::new(vec![
//!     StackFrame::new("com.example.App", "main", FrameType::Interpreted),
//!     StackFrame::new("com.example.App", "work", FrameType::JitCompiled),
//! ])
//! .on_thread(ThreadInfo::new("main", 1, 4242));
//!
//! let tree = FrameTreeBuilder::from_records(Options::default(), &[record])?;
//! let work = tree
//!     .path(&["main (1)", "com.example.App#main", "com.example.App#work"])
//!     .unwrap();
//! assert_eq!(work.self_samples(), 1);
//! assert_eq!(work.frame_type(), FrameType::JitCompiled);
//! # Ok::<(), frametree::Error>(())
//! ```
//!
//! With the `multithreaded` feature (on by default), [`tree::parallel::build_chunks`] builds
//! the same tree from chunks of records on several threads.
//!
//! # Command-line use
//!
//! `frametree-build` reads JSON-lines records from a file or STDIN and prints the tree as folded
//! stacks (the default), as JSON, or as flame graph levels:
//!
//! ```console
//! $ frametree-build recording.jsonl > recording.folded
//! $ frametree-build --format levels --weight recording.jsonl > levels.json
//! ```
//!
//! `frametree-diff` builds a tree out of each of two recordings and prints the differential
//! tree as JSON:
//!
//! ```console
//! $ frametree-diff before.jsonl after.jsonl > diff.json
//! ```

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate log;

pub mod collapse;

pub mod differential;

mod error;

pub mod flamegraph;

/// Classification of frames.
pub mod frame_type;

/// Sampled stacks, the input of a build.
pub mod record;

pub mod tree;

pub use crate::error::{Error, Result};
