#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::search::{SearchEvent, StreamSearch};

#[derive(Arbitrary, Debug)]
struct FuzzSearch {
    needle: Vec<u8>,
    haystack: Vec<u8>,
    split_hint: u8,
}

fn run(needle: &[u8], haystack: &[u8], split_size: usize) -> Option<(Vec<u8>, usize)> {
    let mut search = StreamSearch::new(needle).ok()?;
    let mut data = Vec::new();
    for chunk in haystack.chunks(split_size) {
        search.push(chunk, |event| {
            if let SearchEvent::Data(bytes) = event {
                data.extend_from_slice(bytes);
            }
        });
    }
    data.extend_from_slice(search.lookbehind());
    Some((data, search.matches()))
}

fuzz_target!(|input: FuzzSearch| {
    let split_size = usize::from(input.split_hint).max(1);
    let whole = run(&input.needle, &input.haystack, input.haystack.len().max(1));
    let split = run(&input.needle, &input.haystack, split_size);

    // 分割の仕方で結果が変わってはいけない
    assert_eq!(whole, split);
    if let Some((data, matches)) = whole {
        assert_eq!(
            data.len() + matches * input.needle.len(),
            input.haystack.len()
        );
    }
});
