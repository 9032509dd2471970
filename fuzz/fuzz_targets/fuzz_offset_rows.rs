#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Row {
    interface: u8,
    offset: i16,
}

fuzz_target!(|rows: Vec<Row>| {
    let rows: Vec<bms_config::OffsetRow> = rows
        .iter()
        .map(|r| bms_config::OffsetRow {
            interface: usize::from(r.interface),
            offset: r.offset,
        })
        .collect();
    // Accepted rows must come back as a dense table of the same length.
    if let Ok(offsets) = bms_config::offsets_from_rows(&rows) {
        assert_eq!(offsets.len(), rows.len());
        if offsets.is_empty() {
            return;
        }
        let csv = bms_config::offsets_to_csv(&offsets).expect("serialize");
        assert!(csv.starts_with(b"interface,offset"));
    }
});
