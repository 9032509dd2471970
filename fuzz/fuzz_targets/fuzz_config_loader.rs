#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must reject bad input with an error, never a panic.
    if let Ok(cfg) = toml::from_str::<bms_config::Config>(data) {
        if cfg.validate().is_ok() {
            assert!(!cfg.batteries.is_empty());
            assert!(cfg.batteries.len() <= bms_config::MAX_BATTERIES);
        }
    }
});
