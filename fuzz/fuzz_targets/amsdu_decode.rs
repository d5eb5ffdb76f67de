#![no_main]
use agg80211_core::MacAddress;
use agg80211_mac::wire::amsdu_to_container;
use agg80211_mac::{encode_amsdu, parse_amsdu, DataHeader, MeshControl, MeshSubtype};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&flags, body)) = data.split_first() else { return };
    let mut header = DataHeader::new(MacAddress::local(2), MacAddress::local(1));
    if flags & 1 == 1 {
        let mesh = MeshControl { subtype: MeshSubtype::UpperMessage, ttl: 1, mesh_seq: 0 };
        header = header.with_mesh(mesh);

    }
    let Ok(container) = amsdu_to_container(&header, body) else { return };
    // anything accepted must survive a re-encode
    let bytes = encode_amsdu(&container).expect("re-encode accepted aggregate");
    let again = parse_amsdu(&bytes, header.mesh.is_some()).expect("parse re-encoded aggregate");
    assert_eq!(again.len(), container.count());
});
