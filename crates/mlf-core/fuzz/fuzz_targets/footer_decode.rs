#![no_main]
use libfuzzer_sys::fuzz_target;
use mlf_core::Footer;

fuzz_target!(|data: &[u8]| {
    let _ = Footer::decode(data, data.len() as u64);
});
