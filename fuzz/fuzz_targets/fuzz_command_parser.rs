#![no_main]
use libfuzzer_sys::fuzz_target;
use shelf_core::protocol::{Command, addressed_elsewhere};
use shelf_core::DeviceIdentity;

fuzz_target!(|data: &[u8]| {
    let me = DeviceIdentity::explicit("SHELF_FUZZ");
    let _ = addressed_elsewhere(data, "device_id", &me);
    let _ = addressed_elsewhere(data, "target_device", &me);

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(cmd) = text.parse::<Command>() {
        match cmd {
            Command::Enable(id)
            | Command::Disable(id)
            | Command::Calibrate(id)
            | Command::ReadSlot(id) => {
                assert!(!id.is_empty());
                assert_eq!(id, id.to_ascii_uppercase());
            }
            Command::Status | Command::Read => {}
        }
    }
});
