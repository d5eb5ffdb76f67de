#![no_main]
use agg80211_mac::{build_action, parse_action, ActionBody};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((_, body)) = parse_action(data) else { return };
    if matches!(body, ActionBody::Unknown { .. }) {
        return;
    }
    let (rest, again) = parse_action(&build_action(&body)).expect("parse rebuilt action");
    assert!(rest.is_empty());
    assert_eq!(again, body);
});
