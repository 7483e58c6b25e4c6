//! Comparison of two frame trees.
//!
//! [`generate`] walks a primary and a secondary tree side by side. Labels present in both become
//! [`DiffKind::Shared`] nodes carrying both sides' counters and are compared further down.
//! Subtrees only present on one side become a single [`DiffKind::Added`] (primary only) or
//! [`DiffKind::Removed`] (secondary only) node that carries the subtree as is.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::frame_type::FrameType;
use crate::tree::{Frame, ROOT_LABEL};

const GREEN_COLORS: [&str; 6] = [
    "#e5ffcc", "#e5ffbb", "#ccff99", "#b2ff66", "#99ff33", "#66cc00",
];
const RED_COLORS: [&str; 6] = [
    "#ffeeee", "#ffdddd", "#ffcccc", "#ffaaaa", "#ff8888", "#ff3333",
];
const NEUTRAL_COLOR: &str = "#e6e6e6";

/// Configure the comparison.
///
/// All options default to off.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Scale the secondary tree's samples and weight so its totals match the primary tree's.
    ///
    /// Useful when the two profiles were recorded for different durations or under different
    /// load; otherwise every shared frame looks grown or shrunk by the same amount.
    pub normalize: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffKind {
    /// Present in both trees.
    Shared,
    /// Only present in the primary tree.
    Added,
    /// Only present in the secondary tree.
    Removed,
}

/// A node of a differential tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffFrame {
    pub label: String,
    pub kind: DiffKind,
    pub frame_type: FrameType,
    pub primary_samples: u64,
    pub primary_weight: u64,
    pub secondary_samples: u64,
    pub secondary_weight: u64,
    /// The one-sided subtree of an added or removed node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
    /// Children of a shared node.
    #[serde(serialize_with = "in_label_order")]
    pub children: BTreeMap<String, DiffFrame>,
}

fn in_label_order<S: Serializer>(
    children: &BTreeMap<String, DiffFrame>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(children.values())
}

/// Sample and weight differences of a node, primary minus secondary.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffDetails {
    pub samples: i64,
    pub weight: i64,
    pub percent_samples: f64,
    pub percent_weight: f64,
}

impl DiffFrame {
    fn one_sided(label: &str, frame: &Frame, kind: DiffKind, scale: Scale) -> DiffFrame {
        let (samples, weight) = (frame.total_samples(), frame.total_weight());
        let (primary, secondary) = match kind {
            DiffKind::Removed => ((0, 0), (scale.samples(samples), scale.weight(weight))),
            _ => ((samples, weight), (0, 0)),
        };
        DiffFrame {
            label: label.to_string(),
            kind,
            frame_type: frame.frame_type(),
            primary_samples: primary.0,
            primary_weight: primary.1,
            secondary_samples: secondary.0,
            secondary_weight: secondary.1,
            frame: Some(frame.clone()),
            children: BTreeMap::new(),
        }
    }

    /// Samples of both sides together.
    pub fn samples(&self) -> u64 {
        self.primary_samples.saturating_add(self.secondary_samples)
    }

    /// Weight of both sides together.
    pub fn weight(&self) -> u64 {
        self.primary_weight.saturating_add(self.secondary_weight)
    }

    pub fn get(&self, label: &str) -> Option<&DiffFrame> {
        self.children.get(label)
    }

    pub fn details(&self) -> DiffDetails {
        DiffDetails {
            samples: delta(self.primary_samples, self.secondary_samples),
            weight: delta(self.primary_weight, self.secondary_weight),
            percent_samples: percent(self.primary_samples, self.secondary_samples),
            percent_weight: percent(self.primary_weight, self.secondary_weight),
        }
    }

    /// Fill color for the sample difference: red shades for growth, green for shrinkage.
    pub fn samples_color(&self) -> String {
        self.color(self.primary_samples, self.secondary_samples)
    }

    /// Fill color for the weight difference.
    pub fn weight_color(&self) -> String {
        self.color(self.primary_weight, self.secondary_weight)
    }

    fn color(&self, primary: u64, secondary: u64) -> String {
        match self.kind {
            DiffKind::Added => return RED_COLORS[RED_COLORS.len() - 1].to_string(),
            DiffKind::Removed => return GREEN_COLORS[GREEN_COLORS.len() - 1].to_string(),
            DiffKind::Shared => {}
        }
        if self.frame_type == FrameType::LambdaSynthetic {
            return self.frame_type.color_hex();
        }

        let share = percent(primary, secondary) / 100.0;
        let index = if share <= 0.02 {
            return NEUTRAL_COLOR.to_string();
        } else if share <= 0.05 {
            0
        } else if share <= 0.1 {
            1
        } else if share <= 0.4 {
            2
        } else if share <= 0.8 {
            3
        } else {
            4
        };
        if primary < secondary {
            GREEN_COLORS[index].to_string()
        } else {
            RED_COLORS[index].to_string()
        }
    }
}

/// `primary - secondary`, clamped to the range of `i64`.
fn delta(primary: u64, secondary: u64) -> i64 {
    let diff = i128::from(primary) - i128::from(secondary);
    diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Absolute difference as a percentage of both sides, rounded to two decimals.
fn percent(primary: u64, secondary: u64) -> f64 {
    let total = primary as f64 + secondary as f64;
    if total == 0.0 {
        return 0.0;
    }
    let diff = primary.abs_diff(secondary) as f64;
    (diff / total * 10_000.0).round() / 100.0
}

#[derive(Clone, Copy, Debug)]
struct Scale {
    samples: Option<(u64, u64)>,
    weight: Option<(u64, u64)>,
}

impl Scale {
    fn none() -> Self {
        Scale {
            samples: None,
            weight: None,
        }
    }

    fn samples(self, n: u64) -> u64 {
        apply(self.samples, n)
    }

    fn weight(self, n: u64) -> u64 {
        apply(self.weight, n)
    }
}

fn apply(ratio: Option<(u64, u64)>, n: u64) -> u64 {
    match ratio {
        Some((to, from)) => (n as u128 * to as u128 / from as u128) as u64,
        None => n,
    }
}

fn ratio(to: u64, from: u64) -> Option<(u64, u64)> {
    if from == 0 || to == from {
        None
    } else {
        Some((to, from))
    }
}

/// Compares `primary` against `secondary`, both rooted at the tree root.
pub fn generate(primary: &Frame, secondary: &Frame, opt: &Options) -> DiffFrame {
    let scale = if opt.normalize {
        Scale {
            samples: ratio(primary.total_samples(), secondary.total_samples()),
            weight: ratio(primary.total_weight(), secondary.total_weight()),
        }
    } else {
        Scale::none()
    };
    let diff = shared(ROOT_LABEL, primary, secondary, scale);
    debug!(
        "Compared {} primary against {} secondary samples",
        diff.primary_samples, diff.secondary_samples
    );
    diff
}

fn shared(label: &str, primary: &Frame, secondary: &Frame, scale: Scale) -> DiffFrame {
    let mut children = BTreeMap::new();
    for child in primary.children() {
        let diff = match secondary.get(child.label()) {
            Some(other) => shared(child.label(), child, other, scale),
            None => DiffFrame::one_sided(child.label(), child, DiffKind::Added, scale),
        };
        children.insert(child.label().to_string(), diff);
    }
    for child in secondary.children() {
        if primary.get(child.label()).is_none() {
            let diff = DiffFrame::one_sided(child.label(), child, DiffKind::Removed, scale);
            children.insert(child.label().to_string(), diff);
        }
    }

    DiffFrame {
        label: label.to_string(),
        kind: DiffKind::Shared,
        frame_type: primary.frame_type(),
        primary_samples: primary.total_samples(),
        primary_weight: primary.total_weight(),
        secondary_samples: scale.samples(secondary.total_samples()),
        secondary_weight: scale.weight(secondary.total_weight()),
        frame: None,
        children,
    }
}
