#![no_main]
use agg80211_mac::{encode_ampdu, parse_ampdu};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mpdus) = parse_ampdu(data) else { return };
    let bytes = encode_ampdu(mpdus.iter().copied()).expect("re-encode accepted A-MPDU");
    let again = parse_ampdu(&bytes).expect("parse re-encoded A-MPDU");
    assert_eq!(again, mpdus);
});
