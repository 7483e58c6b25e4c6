//! Level-ordered flame graph data for renderers.
//!
//! [`FlamegraphData::from_frame`] lays a frame tree out the way a flame graph draws it: one
//! [`Level`] per tree depth, each holding the frames at that depth from left to right. A frame's
//! horizontal position is its `left_samples` offset, the sum of the totals of everything drawn
//! before it on the same level within its parent, plus the parent's own offset. Titles are
//! stored once in a shared pool and referenced by index.

mod format;

use ahash::AHashMap;
use num_format::Locale;
use serde::Serialize;

use crate::frame_type::FrameType;
use crate::tree::Frame;

/// How the weight of a tree is summarized in the root title.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightFormat {
    /// Weight is bytes allocated.
    Allocation,
    /// Weight is nanoseconds spent blocked.
    Blocking,
    /// Weight is nanoseconds of latency.
    Latency,
}

impl WeightFormat {
    /// Formats a total weight for display.
    pub fn format(self, weight: u64) -> String {
        match self {
            WeightFormat::Allocation => format!("{} Allocated", format::bytes(weight)),
            WeightFormat::Blocking => format!("{} Blocked", format::nanos(weight)),
            WeightFormat::Latency => format!("{} Latency", format::nanos(weight)),
        }
    }
}

/// Settings for [`FlamegraphData::from_frame`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Include weights and summarize the total weight in the root title.
    ///
    /// Default is `None`, which leaves weights out.
    pub weight: Option<WeightFormat>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlamegraphData {
    pub depth: usize,
    pub levels: Vec<Level>,
    pub title_pool: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Level {
    pub frames: Vec<LevelFrame>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelFrame {
    pub left_samples: u64,
    pub total_samples: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_weight: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_weight: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_samples: Option<u64>,
    pub title_index: usize,
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_types: Option<SampleTypes>,
}

/// Source location of a frame; unknown parts are left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Position {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bci: Option<i32>,
}

/// Per-tier sample counts of a Java frame; zero counts are left out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleTypes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inlined: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c1: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpret: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jit: Option<u64>,
}

fn non_zero(n: u64) -> Option<u64> {
    if n > 0 {
        Some(n)
    } else {
        None
    }
}

struct TitlePool {
    titles: Vec<String>,
    index: AHashMap<String, usize>,
}

impl TitlePool {
    fn index_of(&mut self, title: &str) -> usize {
        if let Some(&i) = self.index.get(title) {
            return i;
        }
        let i = self.titles.len();
        self.titles.push(title.to_string());
        self.index.insert(title.to_string(), i);
        i
    }
}

impl FlamegraphData {
    /// Lays out the whole tree rooted at `root`.
    pub fn from_frame(root: &Frame, opt: &Options) -> FlamegraphData {
        let depth = root.depth(0);
        let mut levels = vec![Level::default(); depth];
        let mut pool = TitlePool {
            titles: Vec::new(),
            index: AHashMap::new(),
        };

        let title = root_title(root, opt.weight);
        add_frame(&mut levels, &mut pool, opt, &title, root, 0, 0, 0);

        FlamegraphData {
            depth,
            levels,
            title_pool: pool.titles,
        }
    }

    /// The title of the given frame.
    pub fn title(&self, frame: &LevelFrame) -> &str {
        &self.title_pool[frame.title_index]
    }
}

fn root_title(root: &Frame, weight: Option<WeightFormat>) -> String {
    let mut samples = num_format::Buffer::default();
    samples.write_formatted(&root.total_samples(), &Locale::en);
    match weight {
        Some(weight) => format!(
            "{} Event(s), {}",
            samples.as_str(),
            weight.format(root.total_weight())
        ),
        None => format!("{} Event(s)", samples.as_str()),
    }
}

#[allow(clippy::too_many_arguments)]
fn add_frame(
    levels: &mut [Level],
    pool: &mut TitlePool,
    opt: &Options,
    title: &str,
    frame: &Frame,
    level: usize,
    mut left_samples: u64,
    mut left_weight: u64,
) {
    let with_weight = opt.weight.is_some();
    let position = if frame.line_number() > 0 || frame.bytecode_index() > 0 {
        Some(Position {
            line: Some(frame.line_number()).filter(|&l| l > 0),
            bci: Some(frame.bytecode_index()).filter(|&b| b > 0),
        })
    } else {
        None
    };
    let sample_types = SampleTypes {
        inlined: non_zero(frame.inlined_samples()),
        c1: non_zero(frame.c1_samples()),
        interpret: non_zero(frame.interpreted_samples()),
        jit: non_zero(frame.jit_compiled_samples()),
    };
    let sample_types = if sample_types == SampleTypes::default() {
        None
    } else {
        Some(sample_types)
    };

    levels[level].frames.push(LevelFrame {
        left_samples,
        total_samples: frame.total_samples(),
        left_weight: Some(left_weight).filter(|_| with_weight),
        total_weight: Some(frame.total_weight()).filter(|_| with_weight),
        self_samples: non_zero(frame.self_samples()),
        title_index: pool.index_of(title),
        frame_type: frame.frame_type(),
        position,
        sample_types,
    });

    for child in frame.children() {
        add_frame(
            levels,
            pool,
            opt,
            child.label(),
            child,
            level + 1,
            left_samples,
            left_weight,
        );
        left_samples += child.total_samples();
        left_weight += child.total_weight();
    }
}
