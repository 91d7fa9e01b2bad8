#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = shelf_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // A config that validates must map into runtime settings.
        let _ = shelf_core::NodeCfg::from(&cfg);
    }
});
