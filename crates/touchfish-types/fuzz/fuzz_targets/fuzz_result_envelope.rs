#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Recipe stdout is untrusted; parsing must only ever return Ok or Err
    if let Ok(envelope) = touchfish_types::ResultEnvelope::parse(data) {
        for item in &envelope.items {
            assert!(item.parameters.keys().all(|k| *k < item.actions.len()));
        }
    }
});
