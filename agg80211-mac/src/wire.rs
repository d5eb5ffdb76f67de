#![forbid(unsafe_code)]

//! Octet-level A-MSDU and A-MPDU framing.
//!
//! A-MSDU subframe: DA(6) SA(6) length(2, big endian) [mesh control(6)] body,
//! padded to four octets except for the last subframe.
//!
//! A-MPDU subframe: delimiter(4) MPDU, padded to four octets except for the
//! last subframe. The delimiter carries a 12-bit MPDU length in the upper bits
//! of a little-endian u16, a CRC-8 over those two octets and the 0x4E signature.

use agg80211_core::MacAddress;
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, le_u16, le_u32, u8 as parse_u8},
    IResult,
};

use crate::errors::{MacError, MacResult};
use crate::frame::{DataHeader, DataUnit, MeshControl, MeshSubtype};
use crate::msdu::AggregateContainer;

pub const MPDU_DELIMITER_LEN: usize = 4;
pub const MPDU_DELIMITER_SIGNATURE: u8 = 0x4E;
/// Largest MPDU length a delimiter can express.
pub const MAX_DELIMITED_MPDU_LEN: usize = 0x0FFF;
const MESH_CONTROL_LEN: usize = 6;

fn pad_to_four(out: &mut Vec<u8>, start: usize) {
    while (out.len() - start) % 4 != 0 {
        out.push(0);
    }
}

/// Serialize a container as an A-MSDU body. Units without payload contribute
/// an empty body.
pub fn encode_amsdu(container: &AggregateContainer) -> MacResult<Vec<u8>> {
    let mut out = Vec::with_capacity(container.byte_len() as usize);
    let count = container.count();
    for (i, sub) in container.iter().enumerate() {
        let start = out.len();
        let h = sub.header();
        let body: &[u8] = sub.payload().map_or(&[], |p| p.as_ref());
        let mesh_len = if h.mesh.is_some() { MESH_CONTROL_LEN } else { 0 };
        let body_len = u16::try_from(body.len() + mesh_len)
            .map_err(|_| MacError::FrameTooLong { len: body.len() as u64, max: u16::MAX as u64 })?;
        out.extend_from_slice(&h.destination().octets());
        out.extend_from_slice(&h.source().octets());
        out.extend_from_slice(&body_len.to_be_bytes());
        if let Some(mesh) = h.mesh {
            out.push(0); // mesh flags
            out.push(mesh.ttl);
            out.extend_from_slice(&mesh.mesh_seq.to_le_bytes());
        }
        out.extend_from_slice(body);
        if i + 1 < count {
            pad_to_four(&mut out, start);
        }
    }
    Ok(out)
}

/// One parsed A-MSDU subframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmsduSubframe<'a> {
    pub da: MacAddress,
    pub sa: MacAddress,
    /// (ttl, mesh sequence) when the aggregate is a mesh aggregate.
    pub mesh: Option<(u8, u32)>,
    pub body: &'a [u8],
}

fn parse_mac(input: &[u8]) -> IResult<&[u8], MacAddress> {
    let (input, raw) = take(6usize)(input)?;
    let mut octets = [0u8; 6];
    octets.copy_from_slice(raw);
    Ok((input, MacAddress(octets)))
}

fn parse_amsdu_subframe(input: &[u8], mesh: bool) -> IResult<&[u8], AmsduSubframe<'_>> {
    let (input, da) = parse_mac(input)?;
    let (input, sa) = parse_mac(input)?;
    let (input, len) = be_u16(input)?;
    let (input, mesh_ctl, body_len) = if mesh {
        let (input, _flags) = parse_u8(input)?;
        let (input, ttl) = parse_u8(input)?;
        let (input, seq) = le_u32(input)?;
        let body_len = (len as usize).checked_sub(MESH_CONTROL_LEN).ok_or_else(|| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::LengthValue))
        })?;
        (input, Some((ttl, seq)), body_len)
    } else {
        (input, None, len as usize)
    };
    let (input, body) = take(body_len)(input)?;
    Ok((input, AmsduSubframe { da, sa, mesh: mesh_ctl, body }))
}

/// Split an A-MSDU body into subframes. Padding between subframes is skipped;
/// trailing bytes that cannot hold another subframe are malformed.
pub fn parse_amsdu(input: &[u8], mesh: bool) -> MacResult<Vec<AmsduSubframe<'_>>> {
    let mut out = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let before = rest.len();
        let (after, sub) = parse_amsdu_subframe(rest, mesh)?;
        out.push(sub);
        rest = after;
        if rest.is_empty() {
            break;
        }
        let consumed = before - rest.len();
        let padding = (4 - consumed % 4) % 4;
        if rest.len() <= padding {
            return Err(MacError::Malformed(format!(
                "{} trailing octets after subframe",
                rest.len()
            )));
        }
        rest = &rest[padding..];
    }
    Ok(out)
}

/// Rebuild a container from A-MSDU octets received under `header`.
pub fn amsdu_to_container(header: &DataHeader, input: &[u8]) -> MacResult<AggregateContainer> {
    let mesh = header.mesh.is_some();
    let mut container = AggregateContainer::new(header.clone());
    for sub in parse_amsdu(input, mesh)? {
        let mut h = header.clone();
        h.set_endpoints(sub.da, sub.sa);
        if let Some((ttl, mesh_seq)) = sub.mesh {
            h.mesh = Some(MeshControl { subtype: MeshSubtype::UpperMessage, ttl, mesh_seq });
        }
        container.push_back(DataUnit::new(h, Bytes::copy_from_slice(sub.body)))?;
    }
    Ok(container)
}

/// CRC-8 of an MPDU delimiter (x^8 + x^2 + x + 1, initial 0xFF, inverted).
pub fn delimiter_crc(bytes: [u8; 2]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    !crc
}

fn delimiter(len: usize) -> [u8; 4] {
    let field = ((len as u16) & 0x0FFF) << 4;
    let [lo, hi] = field.to_le_bytes();
    [lo, hi, delimiter_crc([lo, hi]), MPDU_DELIMITER_SIGNATURE]
}

/// Concatenate MPDUs into an A-MPDU.
pub fn encode_ampdu<'a>(mpdus: impl IntoIterator<Item = &'a [u8]>) -> MacResult<Vec<u8>> {
    let mpdus: Vec<&[u8]> = mpdus.into_iter().collect();
    let mut out = Vec::new();
    for (i, mpdu) in mpdus.iter().enumerate() {
        if mpdu.len() > MAX_DELIMITED_MPDU_LEN {
            return Err(MacError::FrameTooLong {
                len: mpdu.len() as u64,
                max: MAX_DELIMITED_MPDU_LEN as u64,
            });

        }
        let start = out.len();
        out.extend_from_slice(&delimiter(mpdu.len()));
        out.extend_from_slice(mpdu);
        if i + 1 < mpdus.len() {
            pad_to_four(&mut out, start);
        }
    }
    Ok(out)
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], (u16, u8, u8, [u8; 2])> {
    let (rest, raw) = take(2usize)(input)?;
    let (_, field) = le_u16(raw)?;
    let (rest, crc) = parse_u8(rest)?;
    let (rest, signature) = parse_u8(rest)?;
    Ok((rest, (field >> 4, crc, signature, [raw[0], raw[1]])))
}

/// Split an A-MPDU into its MPDUs.
pub fn parse_ampdu(input: &[u8]) -> MacResult<Vec<&[u8]>> {
    let mut out = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let before = rest.len();
        let (after, (len, crc, signature, raw)) = parse_delimiter(rest)?;
        if signature != MPDU_DELIMITER_SIGNATURE {
            return Err(MacError::Malformed(format!("bad delimiter signature {signature:#04x}")));
        }
        if crc != delimiter_crc(raw) {
            return Err(MacError::Malformed("delimiter CRC mismatch".into()));
        }
        let (after, mpdu) = take::<_, _, nom::error::Error<&[u8]>>(len as usize)(after)?;
        out.push(mpdu);
        rest = after;
        let consumed = before - rest.len();
        let padding = ((4 - consumed % 4) % 4).min(rest.len());
        rest = &rest[padding..];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> DataHeader {
        DataHeader::new(MacAddress::local(2), MacAddress::local(1))
    }

    fn container(bodies: &[&'static [u8]], h: DataHeader) -> AggregateContainer {
        let mut c = AggregateContainer::new(h.clone());
        for body in bodies {
            c.push_back(DataUnit::new(h.clone(), Bytes::from_static(body))).unwrap();
        }
        c
    }

    #[test]
    fn amsdu_length_matches_model() {
        let c = container(&[b"abc", b"hello", b"x"], header());
        let bytes = encode_amsdu(&c).unwrap();
        assert_eq!(bytes.len() as u64, c.byte_len());
        let subs = parse_amsdu(&bytes, false).unwrap();
        let bodies: Vec<&[u8]> = subs.iter().map(|s| s.body).collect();
        assert_eq!(bodies, vec![&b"abc"[..], &b"hello"[..], &b"x"[..]]);
        assert_eq!(subs[0].da, MacAddress::local(2));
        assert_eq!(subs[0].sa, MacAddress::local(1));
    }

    #[test]
    fn mesh_amsdu_carries_control() {
        let h = header().with_mesh(MeshControl::upper(7, 0x01020304));
        let c = container(&[b"abcd", b"ef"], h.clone());
        let bytes = encode_amsdu(&c).unwrap();
        assert_eq!(bytes.len() as u64, c.byte_len());
        let rebuilt = amsdu_to_container(&h, &bytes).unwrap();
        assert_eq!(rebuilt.count(), 2);
        assert_eq!(rebuilt.byte_len(), c.byte_len());
        let first = rebuilt.get(0).unwrap();
        assert_eq!(first.header().mesh.map(|m| (m.ttl, m.mesh_seq)), Some((7, 0x01020304)));
    }

    #[test]
    fn amsdu_trailing_garbage_is_rejected() {
        let c = container(&[b"abc"], header());
        let mut bytes = encode_amsdu(&c).unwrap();
        bytes.push(0);
        assert!(parse_amsdu(&bytes, false).is_err());
        assert!(parse_amsdu(&bytes[..10], false).is_err());
    }

    #[test]
    fn ampdu_delimiters() {
        let a = [1u8; 5];
        let b = [2u8; 8];
        let bytes = encode_ampdu([&a[..], &b[..]]).unwrap();
        assert_eq!(bytes.len(), 4 + 5 + 3 + 4 + 8);
        assert_eq!(bytes[3], MPDU_DELIMITER_SIGNATURE);
        assert_eq!(parse_ampdu(&bytes).unwrap(), vec![&a[..], &b[..]]);
    }

    #[test]
    fn ampdu_corruption_is_detected() {
        let a = [9u8; 4];
        let mut bytes = encode_ampdu([&a[..]]).unwrap();
        bytes[0] ^= 0x10;
        assert!(matches!(parse_ampdu(&bytes), Err(MacError::Malformed(_))));
        let long = vec![0u8; MAX_DELIMITED_MPDU_LEN + 1];
        assert!(matches!(encode_ampdu([&long[..]]), Err(MacError::FrameTooLong { .. })));
    }
}
