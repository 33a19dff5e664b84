#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = pool_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // anything that validates must convert into runtime settings
            let _ = pool_core::PlantCfg::from(&cfg);
        }
    }
});
