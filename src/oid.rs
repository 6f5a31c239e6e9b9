//! Object Identifier (OID) type and the ordering predicates used by walks.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` to avoid heap allocation for common OIDs.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{DecodeErrorKind, Error, OidErrorKind, Result};

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a value".
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from arc values.
    ///
    /// ```
    /// use snmp_session::oid::Oid;
    ///
    /// let oid = Oid::new([1, 3, 6, 1]);
    /// assert_eq!(oid.len(), 4);
    /// ```
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted-decimal notation.
    ///
    /// A single leading dot is accepted (`".1.3.6.1"`), as printed by many tools.
    ///
    /// ```
    /// use snmp_session::oid::Oid;
    ///
    /// let oid = Oid::parse(".1.3.6.1.2.1.1.1.0").unwrap();
    /// assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    /// assert!(Oid::parse("1.3.x").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Err(Error::invalid_oid_with_input(OidErrorKind::Empty, s));
        }

        let mut arcs = SmallVec::new();
        for part in trimmed.split('.') {
            let arc: u32 = part
                .parse()
                .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s))?;
            arcs.push(arc);
        }

        if arcs.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid_with_input(
                OidErrorKind::TooManyArcs {
                    count: arcs.len(),
                    max: MAX_OID_LEN,
                },
                s,
            ));
        }

        Ok(Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Returns true if the OID has no arcs.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Returns true if `prefix` is a (non-strict) prefix of this OID.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// Arcs following `prefix`, or `None` if `prefix` does not match.
    pub fn suffix(&self, prefix: &Oid) -> Option<&[u32]> {
        self.arcs.strip_prefix(prefix.arcs.as_slice())
    }

    /// Parent OID (all arcs except the last).
    pub fn parent(&self) -> Option<Oid> {
        if self.arcs.is_empty() {
            None
        } else {
            Some(Self::from_slice(&self.arcs[..self.arcs.len() - 1]))
        }
    }

    /// Child OID with `arc` appended.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Self { arcs }
    }

    /// Child OID with every arc of `arcs` appended.
    pub fn extend(&self, arcs: &[u32]) -> Oid {
        let mut out = self.arcs.clone();
        out.extend_from_slice(arcs);
        Self { arcs: out }
    }

    /// Decode OID content octets (the value part of an OBJECT IDENTIFIER).
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs = SmallVec::new();
        let (first, mut pos) = decode_subidentifier(data, 0)?;
        match first {
            0..40 => {
                arcs.push(0);
                arcs.push(first);
            }
            40..80 => {
                arcs.push(1);
                arcs.push(first - 40);
            }
            _ => {
                arcs.push(2);
                arcs.push(first - 80);
            }
        }

        while pos < data.len() {
            let (arc, next) = decode_subidentifier(data, pos)?;
            arcs.push(arc);
            pos = next;
            if arcs.len() > MAX_OID_LEN {
                return Err(Error::decode(
                    pos,
                    DecodeErrorKind::OidTooLong {
                        count: arcs.len(),
                        max: MAX_OID_LEN,
                    },
                ));
            }
        }

        Ok(Self { arcs })
    }
}

/// Base-128 subidentifier starting at `start`; returns (value, next offset).
fn decode_subidentifier(data: &[u8], start: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    let mut i = start;
    loop {
        let Some(&byte) = data.get(i) else {
            return Err(Error::decode(i, DecodeErrorKind::TruncatedData));
        };
        i += 1;
        if value > (u32::MAX >> 7) {
            return Err(Error::decode(i, DecodeErrorKind::IntegerOverflow));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i));
        }
    }
}

/// Does `next` come at or after `prev` in walk order?
///
/// Arcs are compared pairwise as unsigned integers. The first greater arc in
/// `next` answers true and the first smaller one answers false. When either
/// sequence runs out first the answer is true, so an equal OID, or a shorter
/// `next` sharing a prefix with `prev`, both count as following.
///
/// ```
/// use snmp_session::oid;
/// use snmp_session::oid::oid_follows;
///
/// assert!(oid_follows(&oid!(1, 3, 6, 1, 2), &oid!(1, 3, 6, 1, 3)));
/// assert!(!oid_follows(&oid!(1, 3, 6, 1, 3), &oid!(1, 3, 6, 1, 2)));
/// assert!(oid_follows(&oid!(1, 3, 6, 1), &oid!(1, 3, 6, 1)));
/// ```
pub fn oid_follows(prev: &Oid, next: &Oid) -> bool {
    for (a, b) in prev.arcs().iter().zip(next.arcs()) {
        if b > a {
            return true;
        }
        if b < a {
            return false;
        }
    }
    true
}

/// Is `candidate` inside the subtree rooted at `base`?
///
/// ```
/// use snmp_session::oid;
/// use snmp_session::oid::oid_in_subtree;
///
/// let system = oid!(1, 3, 6, 1, 2, 1, 1);
/// assert!(oid_in_subtree(&system, &oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)));
/// assert!(!oid_in_subtree(&system, &oid!(1, 3, 6, 1, 2, 1, 2, 0)));
/// ```
pub fn oid_in_subtree(base: &Oid, candidate: &Oid) -> bool {
    candidate.starts_with(base)
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.arcs {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.arcs.cmp(&other.arcs)
    }
}

/// Build an [`Oid`] from literal arcs.
///
/// ```
/// use snmp_session::oid;
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr.to_string(), "1.3.6.1.2.1.1.1.0");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}
