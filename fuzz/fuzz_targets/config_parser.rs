#![no_main]

use libfuzzer_sys::fuzz_target;
use machrt::config::RealtimeConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and validation must never panic
        let _ = RealtimeConfig::from_toml_str(input);
    }
});
