#![no_main]

use libfuzzer_sys::fuzz_target;
use rv_dataset::MemoryDataset;
use rv_expect::ExpectedDataset;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(expected) = ExpectedDataset::from_json_str(body) else {
        return;
    };
    let Some(content) = expected.expected_content else {
        return;
    };

    // Any well-formed document must verify without panicking, even against
    // a dataset that has none of the declared entities.
    let dataset = MemoryDataset::new("fuzz", 1, 1);
    let _ = rv_verify::verify(&content, &expected.id, &dataset);
});
