#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::{
    FileId, FormEvent, MultipartConfig, MultipartDecoder, MultipartLimits, SinkRead,
};

#[derive(Arbitrary, Debug)]
struct FuzzMultipart {
    body: Vec<u8>,
    split_hint: u8,
    high_water_mark: u8,
    max_header_size: u8,
    max_file_size: u8,
}

#[derive(Debug, Default, PartialEq)]
struct Decoded {
    events: Vec<FormEvent>,
    files: BTreeMap<FileId, (Vec<u8>, Option<SinkRead>)>,
}

fn decode(input: &FuzzMultipart, split_size: usize) -> Decoded {
    let limits = MultipartLimits {
        max_header_size: usize::from(input.max_header_size).max(1),
        max_file_size: usize::from(input.max_file_size),
        ..Default::default()
    };
    let mut decoded = Decoded::default();
    let Ok(config) = MultipartConfig::new("b") else {
        return decoded;
    };
    let config = config
        .with_limits(limits)
        .file_high_water_mark(usize::from(input.high_water_mark).max(1));
    let Ok(mut decoder) = MultipartDecoder::new(config) else {
        return decoded;
    };

    for chunk in input.body.chunks(split_size) {
        // 一時停止はこの後の drain で解除される
        if decoder.feed(chunk).is_err() {
            break;
        }
        drain(&mut decoder, &mut decoded);
    }
    let _ = decoder.end();
    drain(&mut decoder, &mut decoded);
    decoded
}

fn drain(decoder: &mut MultipartDecoder, decoded: &mut Decoded) {
    loop {
        while let Some(event) = decoder.poll_event() {
            decoded.events.push(event);
        }
        let mut closed = false;
        for id in decoder.open_files() {
            let entry = decoded.files.entry(id).or_default();
            loop {
                match decoder.read_file(id) {
                    Ok(SinkRead::Data(data)) => entry.0.extend_from_slice(&data),
                    Ok(SinkRead::Pending) => break,
                    Ok(last) => {
                        entry.1 = Some(last);
                        closed = true;
                        break;
                    }
                    Err(e) => panic!("open file must be readable: {}", e),
                }
            }
        }
        if !closed {
            break;
        }
    }
}

fuzz_target!(|input: FuzzMultipart| {
    let split_size = usize::from(input.split_hint).max(1);
    let whole = decode(&input, input.body.len().max(1));
    let split = decode(&input, split_size);

    // 分割の仕方で結果が変わってはいけない
    assert_eq!(whole, split);
});
