use agg80211_conformance::{payload_lens, peer, unit};
use agg80211_mac::{codec, unwrap_subframe, AggregateContainer, DataHeader, DataUnit};
use proptest::prelude::*;

fn header() -> DataHeader {
    DataHeader::new(peer(0), agg80211_conformance::OWN)
}

fn filled(lens: &[usize]) -> AggregateContainer {
    let mut c = AggregateContainer::new(header());
    for &len in lens {
        c.push_back(unit(peer(0), len)).unwrap();
    }
    c
}

proptest! {
    #[test]
    fn pop_back_undoes_push_back(lens in payload_lens(16), extra in 1usize..1500) {
        let mut c = filled(&lens);
        let before = c.byte_len();
        let u = unit(peer(0), extra);
        c.push_back(u.clone()).unwrap();
        let popped = c.pop_back().unwrap().unwrap();
        prop_assert_eq!(popped, u);
        // the entry before the popped one keeps its padding
        prop_assert!(c.byte_len() >= before);
        prop_assert!(c.byte_len() - before < 4);
        prop_assert_eq!(c.count(), lens.len());
    }

    #[test]
    fn non_last_entries_are_word_aligned(lens in payload_lens(24), fronts in 0usize..4) {
        let mut c = filled(&lens);
        for i in 0..fronts {
            c.push_front(unit(peer(0), 7 + i)).unwrap();
        }
        let n = c.count();
        for (i, e) in c.iter().enumerate() {
            if i + 1 < n {
                prop_assert_eq!(e.byte_len() % 4, 0, "entry {} of {}", i, n);
            }
        }
        let sum: u64 = c.iter().map(|e| e.byte_len()).sum();
        prop_assert_eq!(c.byte_len(), sum);
    }

    #[test]
    fn codec_preserves_length_and_order(lens in payload_lens(20)) {
        let c = filled(&lens);
        let len = c.byte_len();
        let sizes: Vec<u64> = c.iter().map(DataUnit::byte_len).collect();
        let wire = codec::encode(c).unwrap();
        prop_assert_eq!(wire.byte_len, len);
        // one marker and one payload layer per entry
        prop_assert_eq!(wire.depth(), 2 * lens.len());
        let back = codec::decode(wire).unwrap();
        prop_assert_eq!(back.byte_len(), len);
        let back_sizes: Vec<u64> = back.iter().map(DataUnit::byte_len).collect();
        prop_assert_eq!(back_sizes, sizes);
        let payloads: Vec<u64> = back.iter().map(DataUnit::payload_len).collect();
        let expected: Vec<u64> = lens.iter().map(|&l| l as u64).collect();
        prop_assert_eq!(payloads, expected);
    }

    #[test]
    fn expanded_units_match_what_went_in(lens in payload_lens(12)) {
        let units: Vec<DataUnit> = lens.iter().map(|&l| unit(peer(0), l)).collect();
        let mut c = AggregateContainer::new(header());
        for u in &units {
            c.push_back(u.clone()).unwrap();
        }
        let out = codec::expand(c).unwrap();
        prop_assert_eq!(out.len(), units.len());
        for (got, sent) in out.into_iter().zip(units) {
            prop_assert_eq!(unwrap_subframe(got), sent);
        }
    }
}
