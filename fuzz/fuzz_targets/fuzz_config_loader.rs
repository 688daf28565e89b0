#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse, validation and conversion errors are fine; panics are not.
    let Ok(cfg) = glyco_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // Runtime settings re-validate; rejection is fine, panics are not.
    let _ = glyco_core::EngineSettings::try_from(&cfg);
});
