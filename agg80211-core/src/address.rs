#![forbid(unsafe_code)]

//! 48-bit IEEE 802 MAC address.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// IEEE 802 MAC address used to key peers, queues and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// All-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);
    /// All-zero address, used for unset header fields.
    pub const UNSPECIFIED: MacAddress = MacAddress([0x00; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Locally administered unicast address derived from `n`. Handy for
    /// generating distinct peers in simulations.
    pub fn local(n: u32) -> Self {
        let b = n.to_be_bytes();
        Self([0x02, 0x00, b[0], b[1], b[2], b[3]])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit (I/G) set. Broadcast is also multicast.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    /// True when frames to this address can be acknowledged by a single peer.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && !self.is_unspecified()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", o[0], o[1], o[2], o[3], o[4], o[5])
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    /// Accepts `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(CoreError::InvalidAddress(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;

        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let addr: MacAddress = "02:1a:2b:3c:4d:5e".parse().unwrap();
        assert_eq!(addr.0, [0x02, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(addr.to_string(), "02:1a:2b:3c:4d:5e");
        let dashed: MacAddress = "02-1A-2B-3C-4D-5E".parse().unwrap();
        assert_eq!(addr, dashed);
    }

    #[test]
    fn rejects_garbage() {
        assert!("02:1a:2b".parse::<MacAddress>().is_err());
        assert!("zz:1a:2b:3c:4d:5e".parse::<MacAddress>().is_err());
        assert!("021:a:2b:3c:4d:5e".parse::<MacAddress>().is_err());
    }

    #[test]
    fn group_predicates() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(MacAddress::BROADCAST.is_multicast());
        let mcast = MacAddress([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        assert!(mcast.is_multicast());
        assert!(!mcast.is_broadcast());
        assert!(MacAddress::local(7).is_unicast());
        assert!(!MacAddress::UNSPECIFIED.is_unicast());
    }
}
