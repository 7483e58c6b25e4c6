//! Writing frame trees in the folded stack format.
//!
//! Every node that ends at least one stack becomes one line: the labels from the first level
//! below the root down to the node, separated by semicolons, then a space and the node's self
//! count. This is the input format of flame graph tools such as `flamegraph.pl`.

use std::io::{self, Write};

use crate::tree::Frame;

/// Settings for [`write_folded`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Count weight instead of samples.
    ///
    /// Default is `false`.
    pub weight: bool,
}

/// Writes `frame`'s subtree as folded stack lines, sorted, to `writer`.
///
/// The root itself is never written, and nodes whose self count is zero only appear as
/// prefixes. Semicolons inside labels are replaced by colons so they cannot be mistaken for
/// frame separators.
pub fn write_folded<W: Write>(frame: &Frame, opt: &Options, mut writer: W) -> io::Result<()> {
    let mut lines = Vec::new();
    let mut stack = String::new();
    for child in frame.children() {
        collect(child, opt, &mut stack, &mut lines);
    }
    lines.sort();

    let mut buffer = itoa::Buffer::new();
    for (stack, count) in lines {
        writer.write_all(stack.as_bytes())?;
        writer.write_all(b" ")?;
        writer.write_all(buffer.format(count).as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn collect(frame: &Frame, opt: &Options, stack: &mut String, lines: &mut Vec<(String, u64)>) {
    let prefix_len = stack.len();
    if prefix_len > 0 {
        stack.push(';');
    }
    for c in frame.label().chars() {
        stack.push(if c == ';' { ':' } else { c });
    }

    let count = if opt.weight {
        frame.self_weight()
    } else {
        frame.self_samples()
    };
    if count > 0 {
        lines.push((stack.clone(), count));
    }
    for child in frame.children() {
        collect(child, opt, stack, lines);
    }

    stack.truncate(prefix_len);
}
