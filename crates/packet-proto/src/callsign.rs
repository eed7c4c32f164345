//! Amateur-radio callsigns: a base of up to six uppercase alphanumerics plus an SSID.
use std::fmt;
use std::str::FromStr;

/// A callsign, stored as a fixed-size, `Copy` value so address lists never need
/// per-digipeater heap allocation (see the arena note in the design docs).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Callsign {
    base: [u8; 6],
    len: u8,
    pub ssid: u8,
    /// The "has-been-repeated" H-bit, set when this callsign appears as a digipeater
    /// that has already relayed the frame (written `CALL*` in textual form).
    pub repeated: bool,
}

impl Callsign {
    pub fn new(base: &str, ssid: u8) -> Option<Self> {
        let base = base.trim().to_ascii_uppercase();
        if base.is_empty() || base.len() > 6 || ssid > 15 {
            return None;
        }
        if !base.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        let mut buf = [b' '; 6];
        buf[..base.len()].copy_from_slice(base.as_bytes());
        Some(Callsign {
            base: buf,
            len: base.len() as u8,
            ssid,
            repeated: false,
        })
    }

    pub fn base(&self) -> &str {
        std::str::from_utf8(&self.base[..self.len as usize]).unwrap_or("")
    }

    /// Returns `true` if `other` has the same base and SSID, ignoring the repeated flag.
    pub fn same_station(&self, other: &Callsign) -> bool {
        self.base == other.base && self.len == other.len && self.ssid == other.ssid
    }

    /// True if `other` shares only the base callsign (any SSID).
    pub fn same_base(&self, other: &Callsign) -> bool {
        self.base == other.base && self.len == other.len
    }

    pub fn with_repeated(mut self, repeated: bool) -> Self {
        self.repeated = repeated;
        self
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())?;
        if self.ssid != 0 {
            write!(f, "-{}", self.ssid)?;
        }
        if self.repeated {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callsign({self})")
    }
}

impl FromStr for Callsign {
    type Err = String;

    /// Parses `BASE`, `BASE-N`, or `BASE-N*` (trailing `*` sets the repeated flag).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (s, repeated) = match s.strip_suffix('*') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (base, ssid) = match s.split_once('-') {
            Some((b, n)) => (
                b,
                n.parse::<u8>()
                    .map_err(|_| format!("invalid SSID in {s:?}"))?,
            ),
            None => (s, 0),
        };
        Callsign::new(base, ssid)
            .map(|c| c.with_repeated(repeated))
            .ok_or_else(|| format!("invalid callsign {s:?}"))
    }
}

impl serde::Serialize for Callsign {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Callsign {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Callsign::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_ssid() {
        let c = Callsign::from_str("K1ABC-1").unwrap();
        assert_eq!(c.base(), "K1ABC");
        assert_eq!(c.ssid, 1);
        assert_eq!(c.to_string(), "K1ABC-1");
    }

    #[test]
    fn zero_ssid_omitted() {
        let c = Callsign::from_str("WIDE2").unwrap();
        assert_eq!(c.to_string(), "WIDE2");
    }

    #[test]
    fn repeated_marker_round_trips() {
        let c = Callsign::from_str("K1ABC-1*").unwrap();
        assert!(c.repeated);
        assert_eq!(c.to_string(), "K1ABC-1*");
    }

    #[test]
    fn same_base_ignores_ssid() {
        let a = Callsign::from_str("K1MAL-5").unwrap();
        let b = Callsign::from_str("K1MAL-6").unwrap();
        assert!(a.same_base(&b));
        assert!(!a.same_station(&b));
    }

    #[test]
    fn rejects_oversized_base() {
        assert!(Callsign::new("TOOLONGCALL", 0).is_none());
    }
}
