//! Fuzz target: JSON deserialization of `RunBody`.
//!
//! Arbitrary bytes fed to the run request parser must never panic, and any
//! accepted body must carry a valid session id.
#![no_main]

use libfuzzer_sys::fuzz_target;
use shellbox_core::SessionId;
use shellbox_gateway::routes::RunBody;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = serde_json::from_slice::<RunBody>(data) {
        assert!(SessionId::parse(body.session_id.as_str()).is_ok());
    }
});
