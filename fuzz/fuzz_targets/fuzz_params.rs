#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::MultipartConfig;
use shiguredo_multipart::params::HeaderParams;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // パニックしなければ OK
    let params = HeaderParams::parse(s);
    let _ = params.kind();
    let _ = params.get("name");
    let _ = params.get("filename");
    let _ = params.get_raw("boundary");
    let _ = MultipartConfig::from_content_type(s);
});
