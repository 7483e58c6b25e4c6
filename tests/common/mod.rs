#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor};

use frametree::collapse;
use frametree::frame_type::FrameType;
use frametree::record::{self, Record, StackFrame};
use frametree::tree::{self, Frame, FrameTreeBuilder};
use pretty_assertions::assert_eq;

pub fn compare_results<R, E>(result: R, mut expected: E, expected_file: &str)
where
    R: BufRead,
    E: BufRead,
{
    let mut buf = String::new();
    let mut line_num = 1;
    for line in result.lines() {
        let line = line.unwrap();
        if expected.read_line(&mut buf).unwrap() == 0 {
            panic!(
                "\noutput has more lines than expected result file: {}",
                expected_file
            );
        }
        assert_eq!(line, buf.trim_end(), "\n{}:{}", expected_file, line_num);
        buf.clear();
        line_num += 1;
    }

    if expected.read_line(&mut buf).unwrap() > 0 {
        panic!(
            "\n{} has more lines than output, beginning at line: {}",
            expected_file, line_num
        )
    }
}

/// Builds a tree from a recording and compares its folded output against a result file.
pub fn test_folded(
    test_file: &str,
    expected_file: &str,
    tree_options: tree::Options,
    folded_options: collapse::Options,
) {
    let records = record::read_file(Some(test_file))
        .unwrap_or_else(|e| panic!("failed to read {}: {}", test_file, e));
    let tree = FrameTreeBuilder::from_records(tree_options, &records).unwrap();
    assert!(
        tree.inconsistencies().is_empty(),
        "{:?}",
        tree.inconsistencies()
    );

    let expected_len = fs::metadata(expected_file)
        .unwrap_or_else(|_| panic!("Result file {} not found.", expected_file))
        .len() as usize;
    let mut result = Cursor::new(Vec::with_capacity(expected_len));
    collapse::write_folded(&tree, &folded_options, &mut result).unwrap();

    // write out the result to /tmp for easy restoration
    let rand: u64 = rand::random();
    let tm = std::env::temp_dir().join(format!("test-{}.folded", rand));
    if fs::write(&tm, result.get_ref()).is_ok() {
        eprintln!("test output in {}", tm.display());
    }

    result.set_position(0);
    let expected = BufReader::new(File::open(expected_file).unwrap());
    compare_results(result, expected, expected_file);
}

pub fn build(options: tree::Options, records: &[Record]) -> Frame {
    FrameTreeBuilder::from_records(options, records).unwrap()
}

pub fn jit(class: &str, method: &str) -> StackFrame {
    StackFrame::new(class, method, FrameType::JitCompiled)
}

pub fn interpreted(class: &str, method: &str) -> StackFrame {
    StackFrame::new(class, method, FrameType::Interpreted)
}

pub fn native(function: &str) -> StackFrame {
    StackFrame::new("", function, FrameType::Native)
}
