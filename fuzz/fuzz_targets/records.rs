#![no_main]

use frametree::collapse;
use frametree::record::read_records;
use frametree::tree::{FrameTreeBuilder, Options};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let records = match read_records(data) {
        Ok(records) => records,
        Err(_) => return,
    };
    let mut builder = FrameTreeBuilder::from(Options::default());
    for record in &records {
        // rejected records, overflowing ones included, must leave the tree consistent
        let _ = builder.on_record(record);
    }
    let tree = builder.build();
    assert!(tree.inconsistencies().is_empty());
    collapse::write_folded(&tree, &collapse::Options::default(), std::io::sink()).unwrap();
});
