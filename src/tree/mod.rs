//! Aggregation of sampled stacks into a frame tree.
//!
//! A [`FrameTreeBuilder`] turns every [`Record`](crate::record::Record) into a path of
//! [`processor::NewFrame`]s by running its stack through a chain of frame processors (thread
//! roots, allocation and blocking top frames, lambda normalization, plain frames), then merges
//! that path into a shared [`Frame`] tree, adding the record's samples and weight to every node
//! along the way.

mod builder;
mod lambda;
mod naming;
pub mod processor;

#[cfg(feature = "multithreaded")]
pub mod parallel;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash, Hasher};

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::frame_type::FrameType;

pub use self::builder::{FrameTreeBuilder, Options, DEFAULT_NTHREADS};
pub use self::lambda::{is_lambda_infrastructure, LAMBDA_FRAME_LABEL};
pub use self::naming::{name, thread_label};
use self::processor::{NewFrame, NO_LOCATION};

/// Label of the root of every frame tree.
pub const ROOT_LABEL: &str = "all";

// Fixed so that structural hashes are comparable across processes.
const HASH_SEEDS: [u64; 4] = [
    0x6672_616d_6574_7265,
    0x6520_6861_7368_2031,
    0x2f33_2073_7461_626c,
    0x6520_7365_6564_7321,
];

/// A node of the aggregated call tree.
///
/// Every node counts the samples and weight of all stacks passing through it (`total_*`) and of
/// those ending in it (`self_*`). The per-tier counters split `total_samples` by how the JVM
/// executed the frame and decide the node's [`FrameType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    label: String,
    line_number: i32,
    bytecode_index: i32,

    total_samples: u64,
    total_weight: u64,
    self_samples: u64,
    self_weight: u64,

    interpreted_samples: u64,
    c1_samples: u64,
    jit_compiled_samples: u64,
    inlined_samples: u64,
    native_samples: u64,
    cpp_samples: u64,
    kernel_samples: u64,

    synthetic_type: Option<FrameType>,
    highlighted: bool,

    children: BTreeMap<String, Frame>,
}

impl Default for Frame {
    fn default() -> Self {
        Frame::root()
    }
}

impl Frame {
    /// An empty tree.
    pub fn root() -> Frame {
        Frame::new(ROOT_LABEL, NO_LOCATION, NO_LOCATION)
    }

    pub(crate) fn new<L: Into<String>>(label: L, line_number: i32, bytecode_index: i32) -> Frame {
        Frame {
            label: label.into(),
            line_number,
            bytecode_index,
            total_samples: 0,
            total_weight: 0,
            self_samples: 0,
            self_weight: 0,
            interpreted_samples: 0,
            c1_samples: 0,
            jit_compiled_samples: 0,
            inlined_samples: 0,
            native_samples: 0,
            cpp_samples: 0,
            kernel_samples: 0,
            synthetic_type: None,
            highlighted: false,
            children: BTreeMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Line number of the first occurrence, or `-1` if locations were not recorded.
    pub fn line_number(&self) -> i32 {
        self.line_number
    }

    /// Bytecode index of the first occurrence, or `-1` if locations were not recorded.
    pub fn bytecode_index(&self) -> i32 {
        self.bytecode_index
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn self_samples(&self) -> u64 {
        self.self_samples
    }

    pub fn self_weight(&self) -> u64 {
        self.self_weight
    }

    pub fn interpreted_samples(&self) -> u64 {
        self.interpreted_samples
    }

    pub fn c1_samples(&self) -> u64 {
        self.c1_samples
    }

    pub fn jit_compiled_samples(&self) -> u64 {
        self.jit_compiled_samples
    }

    pub fn inlined_samples(&self) -> u64 {
        self.inlined_samples
    }

    pub fn native_samples(&self) -> u64 {
        self.native_samples
    }

    pub fn cpp_samples(&self) -> u64 {
        self.cpp_samples
    }

    pub fn kernel_samples(&self) -> u64 {
        self.kernel_samples
    }

    pub fn synthetic_type(&self) -> Option<FrameType> {
        self.synthetic_type
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    /// The child labelled `label`.
    pub fn get(&self, label: &str) -> Option<&Frame> {
        self.children.get(label)
    }

    /// The descendant reached by following `labels` from this node.
    pub fn path(&self, labels: &[&str]) -> Option<&Frame> {
        labels
            .iter()
            .try_fold(self, |frame, label| frame.children.get(*label))
    }

    /// Children in label order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = &Frame> + '_ {
        self.children.values()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Adds one occurrence of a frame of `frame_type` to this node.
    ///
    /// Java tiers and native, C++ and kernel code feed their per-tier counter. Synthetic types
    /// are remembered instead, the most recent one winning.
    pub(crate) fn increment(&mut self, frame_type: FrameType, samples: u64, weight: u64, is_top: bool) {
        match frame_type {
            FrameType::Interpreted => self.interpreted_samples += samples,
            FrameType::C1Compiled => self.c1_samples += samples,
            FrameType::JitCompiled => self.jit_compiled_samples += samples,
            FrameType::Inlined => self.inlined_samples += samples,
            FrameType::Native => self.native_samples += samples,
            FrameType::Cpp => self.cpp_samples += samples,
            FrameType::Kernel => self.kernel_samples += samples,
            synthetic => self.synthetic_type = Some(synthetic),
        }

        self.total_samples += samples;
        self.total_weight += weight;
        if is_top {
            self.self_samples += samples;
            self.self_weight += weight;
        }
    }

    /// Whether `samples` and `weight` can be added to this node's totals without overflow.
    ///
    /// On a root this covers every counter in the tree, since no counter exceeds the root
    /// totals.
    pub(crate) fn can_absorb(&self, samples: u64, weight: u64) -> bool {
        self.total_samples.checked_add(samples).is_some()
            && self.total_weight.checked_add(weight).is_some()
    }

    /// Finds or creates the child for `frame` and counts it, returning the child.
    pub(crate) fn add_frame(&mut self, frame: &NewFrame) -> &mut Frame {
        let child = self
            .children
            .entry(frame.label.clone())
            .or_insert_with(|| Frame::new(frame.label.clone(), frame.line_number, frame.bytecode_index));
        child.increment(frame.frame_type, frame.samples, frame.weight, frame.is_top_frame);
        child
    }

    /// Merges another tree rooted at the same position into this one.
    ///
    /// Counters are summed node by node, saturating at `u64::MAX`, nodes only present in `other`
    /// are moved over. Location information already present in `self` is kept.
    pub fn combine(&mut self, other: Frame) {
        self.total_samples = self.total_samples.saturating_add(other.total_samples);
        self.total_weight = self.total_weight.saturating_add(other.total_weight);
        self.self_samples = self.self_samples.saturating_add(other.self_samples);
        self.self_weight = self.self_weight.saturating_add(other.self_weight);
        self.interpreted_samples = self.interpreted_samples.saturating_add(other.interpreted_samples);
        self.c1_samples = self.c1_samples.saturating_add(other.c1_samples);
        self.jit_compiled_samples = self.jit_compiled_samples.saturating_add(other.jit_compiled_samples);
        self.inlined_samples = self.inlined_samples.saturating_add(other.inlined_samples);
        self.native_samples = self.native_samples.saturating_add(other.native_samples);
        self.cpp_samples = self.cpp_samples.saturating_add(other.cpp_samples);
        self.kernel_samples = self.kernel_samples.saturating_add(other.kernel_samples);
        if other.synthetic_type.is_some() {
            self.synthetic_type = other.synthetic_type;
        }
        self.highlighted |= other.highlighted;

        for (label, child) in other.children {
            match self.children.entry(label) {
                Entry::Vacant(entry) => {
                    entry.insert(child);
                }
                Entry::Occupied(mut entry) => entry.get_mut().combine(child),
            }
        }
    }

    /// The dominant type of this node.
    ///
    /// Decided, in order: a highlighted node is [`FrameType::HighlightedWarning`]; at least a
    /// third inlined samples makes it inlined; at least half C1 or interpreted samples makes it
    /// C1-compiled or interpreted; any C++, kernel or native samples (checked in that order)
    /// make it that; otherwise the remembered synthetic type, and fully JIT-compiled last.
    pub fn frame_type(&self) -> FrameType {
        let total = self.total_samples;
        if self.highlighted {
            FrameType::HighlightedWarning
        } else if total == 0 {
            self.synthetic_type.unwrap_or(FrameType::JitCompiled)
        } else if self.inlined_samples * 3 >= total {
            FrameType::Inlined
        } else if self.c1_samples * 2 >= total {
            FrameType::C1Compiled
        } else if self.interpreted_samples * 2 >= total {
            FrameType::Interpreted
        } else if self.cpp_samples > 0 {
            FrameType::Cpp
        } else if self.kernel_samples > 0 {
            FrameType::Kernel
        } else if self.native_samples > 0 {
            FrameType::Native
        } else if let Some(synthetic) = self.synthetic_type {
            synthetic
        } else {
            FrameType::JitCompiled
        }
    }

    /// Number of levels in this subtree, only descending into children with at least `cutoff`
    /// total samples.
    pub fn depth(&self, cutoff: u64) -> usize {
        1 + self
            .children
            .values()
            .filter(|child| child.total_samples >= cutoff)
            .map(|child| child.depth(cutoff))
            .max()
            .unwrap_or(0)
    }

    /// Marks the descendant at `labels` as highlighted.
    ///
    /// Returns false, leaving the tree untouched, if no such descendant exists.
    pub fn highlight(&mut self, labels: &[&str]) -> bool {
        let mut frame = self;
        for label in labels {
            frame = match frame.children.get_mut(*label) {
                Some(child) => child,
                None => return false,
            };
        }
        frame.highlighted = true;
        true
    }

    /// A hash of the whole subtree: labels, locations, every counter and the highlighted state.
    ///
    /// Stable across processes. Two trees built from the same records in any order hash equally,
    /// with two exceptions: a node's location is taken from the first record that created it,
    /// so with location parsing on the hash depends on record order, and so does a node reached
    /// through different synthetic types (e.g. one allocated class recorded under two
    /// allocation kinds), which keeps the most recent one.
    pub fn structural_hash(&self) -> u64 {
        let [k0, k1, k2, k3] = HASH_SEEDS;
        let mut hasher = ahash::RandomState::with_seeds(k0, k1, k2, k3).build_hasher();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
        self.line_number.hash(state);
        self.bytecode_index.hash(state);
        for counter in [
            self.total_samples,
            self.total_weight,
            self.self_samples,
            self.self_weight,
            self.interpreted_samples,
            self.c1_samples,
            self.jit_compiled_samples,
            self.inlined_samples,
            self.native_samples,
            self.cpp_samples,
            self.kernel_samples,
        ] {
            counter.hash(state);
        }
        self.synthetic_type.hash(state);
        self.highlighted.hash(state);
        self.children.len().hash(state);
        for child in self.children.values() {
            child.hash_into(state);
        }
    }

    /// Describes every node whose counters do not add up.
    ///
    /// In a tree built from records, every node's totals equal its self counters plus the
    /// totals of its children, self counters never exceed totals and the per-tier counters
    /// never sum to more than the total samples. The result is empty for such trees.
    pub fn inconsistencies(&self) -> Vec<String> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        self.collect_inconsistencies(&mut path, &mut found);
        found
    }

    fn collect_inconsistencies<'a>(&'a self, path: &mut Vec<&'a str>, found: &mut Vec<String>) {
        path.push(&self.label);

        let child_samples: u64 = self.children.values().map(|c| c.total_samples).sum();
        let child_weight: u64 = self.children.values().map(|c| c.total_weight).sum();
        let tiers = self.interpreted_samples
            + self.c1_samples
            + self.jit_compiled_samples
            + self.inlined_samples
            + self.native_samples
            + self.cpp_samples
            + self.kernel_samples;

        if self.self_samples > self.total_samples || self.self_weight > self.total_weight {
            found.push(format!("{}: self exceeds total", path.join(";")));
        }
        if self.total_samples != self.self_samples + child_samples {
            found.push(format!(
                "{}: {} total samples, {} self + {} in children",
                path.join(";"),
                self.total_samples,
                self.self_samples,
                child_samples
            ));
        }
        if self.total_weight != self.self_weight + child_weight {
            found.push(format!(
                "{}: {} total weight, {} self + {} in children",
                path.join(";"),
                self.total_weight,
                self.self_weight,
                child_weight
            ));
        }
        if tiers > self.total_samples {
            found.push(format!(
                "{}: {} tier samples exceed {} total",
                path.join(";"),
                tiers,
                self.total_samples
            ));
        }

        for child in self.children.values() {
            child.collect_inconsistencies(path, found);
        }
        path.pop();
    }
}

struct Children<'a>(&'a BTreeMap<String, Frame>);

impl Serialize for Children<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Frame", 16)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("frameType", &self.frame_type())?;
        s.serialize_field("lineNumber", &self.line_number)?;
        s.serialize_field("bytecodeIndex", &self.bytecode_index)?;
        s.serialize_field("totalSamples", &self.total_samples)?;
        s.serialize_field("totalWeight", &self.total_weight)?;
        s.serialize_field("selfSamples", &self.self_samples)?;
        s.serialize_field("selfWeight", &self.self_weight)?;
        s.serialize_field("interpretedSamples", &self.interpreted_samples)?;
        s.serialize_field("c1Samples", &self.c1_samples)?;
        s.serialize_field("jitCompiledSamples", &self.jit_compiled_samples)?;
        s.serialize_field("inlinedSamples", &self.inlined_samples)?;
        s.serialize_field("nativeSamples", &self.native_samples)?;
        s.serialize_field("cppSamples", &self.cpp_samples)?;
        s.serialize_field("kernelSamples", &self.kernel_samples)?;
        s.serialize_field("children", &Children(&self.children))?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(f: impl FnOnce(&mut Frame)) -> Frame {
        let mut frame = Frame::new("f", NO_LOCATION, NO_LOCATION);
        f(&mut frame);
        frame
    }

    fn descriptor(label: &str, frame_type: FrameType, is_top_frame: bool) -> NewFrame {
        NewFrame {
            label: label.to_string(),
            line_number: NO_LOCATION,
            bytecode_index: NO_LOCATION,
            frame_type,
            is_top_frame,
            samples: 1,
            weight: 10,
        }
    }

    fn add_path(root: &mut Frame, path: &[NewFrame]) {
        root.increment(FrameType::Native, 1, 10, false);
        let mut node = root;
        for frame in path {
            node = node.add_frame(frame);
        }
    }

    #[test]
    fn increment_counts_tiers_and_self() {
        let frame = frame_with(|f| {
            f.increment(FrameType::Interpreted, 2, 20, true);
            f.increment(FrameType::JitCompiled, 3, 30, false);
            f.increment(FrameType::Kernel, 1, 5, false);
        });
        assert_eq!(frame.total_samples(), 6);
        assert_eq!(frame.total_weight(), 55);
        assert_eq!(frame.self_samples(), 2);
        assert_eq!(frame.self_weight(), 20);
        assert_eq!(frame.interpreted_samples(), 2);
        assert_eq!(frame.jit_compiled_samples(), 3);
        assert_eq!(frame.kernel_samples(), 1);
        assert_eq!(frame.synthetic_type(), None);
    }

    #[test]
    fn synthetic_increments_only_set_the_type() {
        let frame = frame_with(|f| f.increment(FrameType::LambdaSynthetic, 4, 0, false));
        assert_eq!(frame.total_samples(), 4);
        assert_eq!(frame.jit_compiled_samples(), 0);
        assert_eq!(frame.synthetic_type(), Some(FrameType::LambdaSynthetic));
        assert_eq!(frame.frame_type(), FrameType::LambdaSynthetic);
    }

    #[test]
    fn dominant_type() {
        let inlined = frame_with(|f| {
            f.increment(FrameType::Inlined, 1, 0, false);
            f.increment(FrameType::JitCompiled, 2, 0, false);
        });
        assert_eq!(inlined.frame_type(), FrameType::Inlined);

        let mostly_jit = frame_with(|f| {
            f.increment(FrameType::Inlined, 1, 0, false);
            f.increment(FrameType::JitCompiled, 3, 0, false);
        });
        assert_eq!(mostly_jit.frame_type(), FrameType::JitCompiled);

        let c1 = frame_with(|f| {
            f.increment(FrameType::C1Compiled, 2, 0, false);
            f.increment(FrameType::JitCompiled, 2, 0, false);
        });
        assert_eq!(c1.frame_type(), FrameType::C1Compiled);

        let interpreted = frame_with(|f| {
            f.increment(FrameType::Interpreted, 1, 0, false);
            f.increment(FrameType::JitCompiled, 1, 0, false);
        });
        assert_eq!(interpreted.frame_type(), FrameType::Interpreted);

        let cpp = frame_with(|f| {
            f.increment(FrameType::Cpp, 1, 0, false);
            f.increment(FrameType::Native, 1, 0, false);
            f.increment(FrameType::JitCompiled, 5, 0, false);
        });
        assert_eq!(cpp.frame_type(), FrameType::Cpp);

        let kernel = frame_with(|f| {
            f.increment(FrameType::Kernel, 1, 0, false);
            f.increment(FrameType::Native, 1, 0, false);
            f.increment(FrameType::JitCompiled, 5, 0, false);
        });
        assert_eq!(kernel.frame_type(), FrameType::Kernel);

        let native = frame_with(|f| {
            f.increment(FrameType::Native, 1, 0, false);
            f.increment(FrameType::JitCompiled, 5, 0, false);
        });
        assert_eq!(native.frame_type(), FrameType::Native);

        assert_eq!(Frame::root().frame_type(), FrameType::JitCompiled);
    }

    #[test]
    fn highlighting() {
        let mut root = Frame::root();
        add_path(
            &mut root,
            &[
                descriptor("A", FrameType::JitCompiled, false),
                descriptor("B", FrameType::Interpreted, true),
            ],
        );

        assert!(!root.highlight(&["A", "C"]));
        assert!(root.path(&["A", "B"]).map_or(false, |b| !b.is_highlighted()));

        assert!(root.highlight(&["A", "B"]));
        let b = root.path(&["A", "B"]).unwrap();
        assert!(b.is_highlighted());
        assert_eq!(b.frame_type(), FrameType::HighlightedWarning);
        assert_eq!(b.frame_type().color_hex(), "#ee00ee");
        assert!(!root.get("A").unwrap().is_highlighted());
    }

    #[test]
    fn depth_respects_cutoff() {
        let mut root = Frame::root();
        add_path(
            &mut root,
            &[
                descriptor("A", FrameType::JitCompiled, false),
                descriptor("B", FrameType::JitCompiled, false),
                descriptor("C", FrameType::JitCompiled, true),
            ],
        );
        add_path(&mut root, &[descriptor("A", FrameType::JitCompiled, true)]);
        add_path(&mut root, &[descriptor("A", FrameType::JitCompiled, true)]);

        assert_eq!(root.depth(0), 4);
        assert_eq!(root.depth(2), 2);
        assert_eq!(root.depth(4), 1);
    }

    #[test]
    fn combine_sums_and_moves() {
        let mut left = Frame::root();
        add_path(
            &mut left,
            &[
                descriptor("A", FrameType::JitCompiled, false),
                descriptor("B", FrameType::JitCompiled, true),
            ],
        );
        let mut right = Frame::root();
        add_path(
            &mut right,
            &[
                descriptor("A", FrameType::Interpreted, false),
                descriptor("C", FrameType::Native, true),
            ],
        );

        let mut both = Frame::root();
        add_path(
            &mut both,
            &[
                descriptor("A", FrameType::JitCompiled, false),
                descriptor("B", FrameType::JitCompiled, true),
            ],
        );
        add_path(
            &mut both,
            &[
                descriptor("A", FrameType::Interpreted, false),
                descriptor("C", FrameType::Native, true),
            ],
        );

        left.combine(right);
        assert_eq!(left, both);
        assert_eq!(left.structural_hash(), both.structural_hash());
        assert!(left.inconsistencies().is_empty());
        assert_eq!(left.get("A").unwrap().total_samples(), 2);
        assert_eq!(left.get("A").unwrap().interpreted_samples(), 1);
    }

    #[test]
    fn combine_saturates() {
        let mut left = frame_with(|f| f.increment(FrameType::JitCompiled, u64::MAX - 1, 1, true));
        assert!(left.can_absorb(1, u64::MAX - 1));
        assert!(!left.can_absorb(2, 0));

        let right = frame_with(|f| f.increment(FrameType::JitCompiled, 5, u64::MAX, true));
        left.combine(right);
        assert_eq!(left.total_samples(), u64::MAX);
        assert_eq!(left.self_samples(), u64::MAX);
        assert_eq!(left.jit_compiled_samples(), u64::MAX);
        assert_eq!(left.total_weight(), u64::MAX);
    }

    #[test]
    fn hash_sees_counters() {
        let mut one = Frame::root();
        add_path(&mut one, &[descriptor("A", FrameType::JitCompiled, true)]);
        let mut two = one.clone();
        assert_eq!(one.structural_hash(), two.structural_hash());

        add_path(&mut two, &[descriptor("A", FrameType::JitCompiled, true)]);
        assert_ne!(one.structural_hash(), two.structural_hash());
    }

    #[test]
    fn inconsistencies_are_reported() {
        let mut root = Frame::root();
        add_path(&mut root, &[descriptor("A", FrameType::JitCompiled, true)]);
        assert!(root.inconsistencies().is_empty());

        root.total_samples += 1;
        let found = root.inconsistencies();
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("all:"), "{}", found[0]);
    }

    #[test]
    fn serializes_children_in_label_order() {
        let mut root = Frame::root();
        add_path(&mut root, &[descriptor("b", FrameType::JitCompiled, true)]);
        add_path(&mut root, &[descriptor("a", FrameType::Cpp, true)]);

        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["label"], "all");
        assert_eq!(json["totalSamples"], 2);
        assert_eq!(json["totalWeight"], 20);
        let children = json["children"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["label"], "a");
        assert_eq!(children[0]["frameType"], "CPP");
        assert_eq!(children[1]["label"], "b");
        assert_eq!(children[1]["frameType"], "JIT_COMPILED");
        assert_eq!(children[1]["selfSamples"], 1);
    }
}
