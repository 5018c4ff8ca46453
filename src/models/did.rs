// src/models/did.rs
//! `did:memo` identifier grammar.
//!
//! Two textual forms are accepted and produced:
//! ```text
//! did:memo:<64-hex>
//! did:memo:<64-hex>#<masterKey|key-N>
//! ```
//! Parsing splits the generic DID URL syntax
//! `did:<method>:<id>[:<id>]*[/<path>][?<query>][#<fragment>]` and then applies
//! the memo method rules on top of it.

use crate::error::ParseError;
use crate::utils::crypto::derive_identifier_hex;
use ethers::types::Address;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The only DID method handled by this crate.
pub const METHOD: &str = "memo";

const MASTER_KEY: &str = "masterKey";
const KEY_PREFIX: &str = "key-";
const IDENTIFIER_HEX_LEN: usize = 64;

/// Generic pieces of a DID or DID URL before method-specific validation.
struct RawDid<'a> {
    method: &'a str,
    id: &'a str,
    segments: Vec<&'a str>,
    path: Option<&'a str>,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl RawDid<'_> {
    fn is_url(&self) -> bool {
        self.path.is_some() || self.query.is_some() || self.fragment.is_some()
    }
}

fn split_did(s: &str) -> Result<RawDid<'_>, ParseError> {
    let (rest, fragment) = match s.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (s, None),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let (did, path) = match rest.find('/') {
        Some(i) => (&rest[..i], Some(&rest[i..])),
        None => (rest, None),
    };

    let parts = did.splitn(3, ':').collect::<Vec<_>>();
    if parts.len() < 3 || parts[0] != "did" {
        return Err(ParseError::Syntax(s.to_string()));
    }
    let method = parts[1];
    if method.is_empty()
        || !method.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return Err(ParseError::Syntax(s.to_string()));
    }

    let id = parts[2];
    let segments = id.split(':').collect::<Vec<_>>();
    if segments.iter().any(|seg| seg.is_empty() || !seg.bytes().all(is_idchar)) {
        return Err(ParseError::Syntax(s.to_string()));
    }

    Ok(RawDid { method, id, segments, path, query, fragment })
}

fn is_idchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'%')
}

fn is_32_byte_hex(s: &str) -> bool {
    s.len() == IDENTIFIER_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Method and segment checks shared by both forms.
fn validate_memo(s: &str, raw: &RawDid<'_>) -> Result<Identifier, ParseError> {
    if raw.method != METHOD {
        return Err(ParseError::UnsupportedMethod(raw.method.to_string()));
    }
    if raw.segments.len() > 1 {
        return Err(ParseError::MultipleSegments(s.to_string()));
    }
    let last = raw.segments[raw.segments.len() - 1];
    if !is_32_byte_hex(last) {
        return Err(ParseError::NotHex(last.to_string()));
    }
    Ok(Identifier {
        method: METHOD.to_string(),
        identifier: raw.id.to_string(),
        parts: raw.segments.iter().map(|seg| seg.to_string()).collect(),
    })
}

/// A `did:memo` decentralized identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    method: String,
    identifier: String,
    parts: Vec<String>,
}

impl Identifier {
    /// Parses and validates a bare DID.
    ///
    /// # Errors
    /// Returns [`ParseError`] if `s` is a DID URL, uses another method, has
    /// more than one identifier segment or the segment is not 64 hex chars.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let raw = split_did(s)?;
        if raw.is_url() {
            return Err(ParseError::UnexpectedUrl(s.to_string()));
        }
        validate_memo(s, &raw)
    }

    /// Parses the bare 64-hex form stored on the ledger.
    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        Self::parse(&format!("did:{METHOD}:{hex}"))
    }

    /// Derives an unregistered identifier from an account address and nonce.
    pub fn derive(address: &Address, nonce: u64) -> Self {
        let identifier = derive_identifier_hex(address.as_bytes(), nonce);
        Identifier {
            method: METHOD.to_string(),
            parts: vec![identifier.clone()],
            identifier,
        }
    }

    /// The all-zero identifier, used for ledger records without a controller.
    pub fn zero() -> Self {
        let identifier = "0".repeat(IDENTIFIER_HEX_LEN);
        Identifier {
            method: METHOD.to_string(),
            parts: vec![identifier.clone()],
            identifier,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method-specific id, as sent to the ledger.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// URL addressing verification-method slot `slot` of this identifier.
    pub fn url(&self, slot: u64) -> IdentifierUrl {
        IdentifierUrl {
            did: self.clone(),
            fragment: Fragment::from_slot(slot),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.identifier)
    }
}

impl FromStr for Identifier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(de::Error::custom)
    }
}

/// Fragment of a memo DID URL, naming a verification-method slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// `masterKey`, slot 0.
    MasterKey,
    /// `key-N`, slot `index`. `width` is the number of digits as written, so
    /// zero-padded forms such as `key-007` print back unchanged.
    Key { index: u64, width: usize },
}

impl Fragment {
    /// Slot 0 is always written as `masterKey`.
    pub fn from_slot(slot: u64) -> Self {
        if slot == 0 {
            Fragment::MasterKey
        } else {
            Fragment::Key { index: slot, width: 0 }
        }
    }

    pub fn slot_index(&self) -> u64 {
        match self {
            Fragment::MasterKey => 0,
            Fragment::Key { index, .. } => *index,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::MasterKey => f.write_str(MASTER_KEY),
            Fragment::Key { index, width } => {
                write!(f, "{}{:0width$}", KEY_PREFIX, index, width = *width)
            }
        }
    }
}

impl FromStr for Fragment {
    type Err = ParseError;

    /// Accepts `masterKey` or `key-<digits>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == MASTER_KEY {
            return Ok(Fragment::MasterKey);
        }
        let digits = s
            .strip_prefix(KEY_PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ParseError::Fragment(s.to_string()))?;
        digits
            .parse::<u64>()
            .map(|index| Fragment::Key { index, width: digits.len() })
            .map_err(|_| ParseError::Fragment(s.to_string()))
    }
}

/// A memo DID plus a fragment addressing one verification-method slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentifierUrl {
    did: Identifier,
    fragment: Fragment,
}

impl IdentifierUrl {
    /// Parses and validates a DID URL.
    ///
    /// # Errors
    /// Returns [`ParseError`] if `s` is a bare DID, fails the memo method
    /// checks, carries a path or query, or has an unsupported fragment.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let raw = split_did(s)?;
        if !raw.is_url() {
            return Err(ParseError::NotUrl(s.to_string()));
        }
        let did = validate_memo(s, &raw)?;
        if raw.path.is_some() || raw.query.is_some() {
            return Err(ParseError::PathOrQuery(s.to_string()));
        }
        let fragment = raw.fragment.unwrap_or_default().parse()?;
        Ok(IdentifierUrl { did, fragment })
    }

    /// The identifier this URL belongs to.
    pub fn did(&self) -> &Identifier {
        &self.did
    }

    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    /// Verification-method slot addressed by this URL.
    pub fn slot_index(&self) -> u64 {
        self.fragment.slot_index()
    }
}

impl fmt::Display for IdentifierUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.did, self.fragment)
    }
}

impl FromStr for IdentifierUrl {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for IdentifierUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdentifierUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IdentifierUrl::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "ce5ac89f84530a1cf2cdee5a0643045a8b0a4995b1c765ba289d7859cfb1193e";

    fn did_string() -> String {
        format!("did:memo:{HEX}")
    }

    #[test]
    fn test_parse_identifier() {
        let did = Identifier::parse(&did_string()).unwrap();
        assert_eq!(did.method(), "memo");
        assert_eq!(did.identifier(), HEX);
        assert_eq!(did.parts(), &[HEX.to_string()]);
        assert_eq!(did.to_string(), did_string());
    }

    #[test]
    fn test_identifier_keeps_case() {
        let upper = format!("did:memo:{}", HEX.to_uppercase());
        let did = Identifier::parse(&upper).unwrap();
        assert_eq!(did.to_string(), upper);
    }

    #[test]
    fn test_identifier_rejections() {
        let rejected = [
            format!("did:memo:0x{HEX}"),
            "did:memo:ieuydhrndjcnfjs.sdfegreccc".to_string(),
            format!("dim:memo:{HEX}"),
            format!("did:example:{HEX}"),
            format!("did:memo:{}", &HEX[..63]),
            format!("did:memo:{HEX}00"),
            format!("did:memo:666:{HEX}"),
            format!("did:memo:{HEX}#masterKey"),
            format!("did:memo:{HEX}/path"),
            format!("did:memo:{HEX}?versionId=1"),
            "did:memo:".to_string(),
            "did:memo".to_string(),
            String::new(),
        ];
        for s in rejected {
            assert!(Identifier::parse(&s).is_err(), "{s} should be rejected");
        }
    }

    #[test]
    fn test_identifier_error_kinds() {
        assert!(matches!(
            Identifier::parse(&format!("did:example:{HEX}")),
            Err(ParseError::UnsupportedMethod(m)) if m == "example"
        ));
        assert!(matches!(
            Identifier::parse(&format!("did:memo:666:{HEX}")),
            Err(ParseError::MultipleSegments(_))
        ));
        assert!(matches!(
            Identifier::parse(&format!("did:memo:{HEX}#key-1")),
            Err(ParseError::UnexpectedUrl(_))
        ));
    }

    #[test]
    fn test_parse_url() {
        let master = IdentifierUrl::parse(&format!("{}#masterKey", did_string())).unwrap();
        assert_eq!(master.fragment(), Fragment::MasterKey);
        assert_eq!(master.slot_index(), 0);
        assert_eq!(master.did().identifier(), HEX);

        let key = IdentifierUrl::parse(&format!("{}#key-7", did_string())).unwrap();
        assert_eq!(key.slot_index(), 7);
        assert_eq!(key.to_string(), format!("{}#key-7", did_string()));
    }

    #[test]
    fn test_url_rejections() {
        let base = did_string();
        let rejected = [
            base.clone(),
            format!("{base}#key"),
            format!("{base}#key-"),
            format!("{base}#key-1a"),
            format!("{base}#key--1"),
            format!("{base}#abc"),
            format!("{base}#masterkey"),
            format!("{base}#"),
            format!("{base}/path#key-1"),
            format!("{base}?service=x#key-1"),
            format!("{base}/path"),
            format!("did:example:{HEX}#key-1"),
            format!("did:memo:666:{HEX}#key-1"),
            format!("did:memo:{}#key-1", &HEX[1..]),
            format!("{base}#key-99999999999999999999999"),
        ];
        for s in rejected {
            assert!(IdentifierUrl::parse(&s).is_err(), "{s} should be rejected");
        }
        assert!(matches!(
            IdentifierUrl::parse(&format!("{base}/path#key-1")),
            Err(ParseError::PathOrQuery(_))
        ));
        assert!(matches!(IdentifierUrl::parse(&base), Err(ParseError::NotUrl(_))));
    }

    #[test]
    fn test_round_trip() {
        let inputs = [
            did_string(),
            format!("did:memo:{}", HEX.to_uppercase()),
        ];
        for s in inputs {
            let did = Identifier::parse(&s).unwrap();
            assert_eq!(Identifier::parse(&did.to_string()).unwrap(), did);
        }

        let urls = [
            format!("{}#masterKey", did_string()),
            format!("{}#key-0", did_string()),
            format!("{}#key-12", did_string()),
            format!("{}#key-01", did_string()),
            format!("{}#key-007", did_string()),
        ];
        for s in urls {
            let url = IdentifierUrl::parse(&s).unwrap();
            assert_eq!(url.to_string(), s);
            assert_eq!(IdentifierUrl::parse(&url.to_string()).unwrap(), url);
        }
    }

    #[test]
    fn test_zero_padded_fragment_keeps_its_text() {
        let padded = IdentifierUrl::parse(&format!("{}#key-01", did_string())).unwrap();
        let plain = IdentifierUrl::parse(&format!("{}#key-1", did_string())).unwrap();
        assert_eq!(padded.slot_index(), 1);
        assert_eq!(padded.slot_index(), plain.slot_index());
        // the ledger keys grants by URL text, so the two stay distinct
        assert_ne!(padded, plain);
        assert_eq!(padded.fragment(), Fragment::Key { index: 1, width: 2 });
    }

    #[test]
    fn test_url_from_slot() {
        let did = Identifier::parse(&did_string()).unwrap();
        assert_eq!(did.url(0).to_string(), format!("{}#masterKey", did_string()));
        assert_eq!(did.url(3).to_string(), format!("{}#key-3", did_string()));
        assert_eq!(did.url(3).did(), &did);
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let url = IdentifierUrl::parse(&format!("{}#key-2", did_string())).unwrap();
        let json = serde_json::to_string(&url).unwrap();
        assert_eq!(json, format!("\"{}#key-2\"", did_string()));
        let back: IdentifierUrl = serde_json::from_str(&json).unwrap();
        assert_eq!(back, url);

        let did: Identifier = serde_json::from_str(&format!("\"{}\"", did_string())).unwrap();
        assert_eq!(serde_json::to_string(&did).unwrap(), format!("\"{}\"", did_string()));
    }

    #[test]
    fn test_deserialize_revalidates() {
        assert!(serde_json::from_str::<Identifier>("\"did:memo:abc\"").is_err());
        assert!(serde_json::from_str::<Identifier>(&format!("\"{}#masterKey\"", did_string())).is_err());
        assert!(serde_json::from_str::<IdentifierUrl>(&format!("\"{}\"", did_string())).is_err());
    }

    #[test]
    fn test_zero_and_derived_identifiers() {
        let zero = Identifier::zero();
        assert_eq!(Identifier::parse(&zero.to_string()).unwrap(), zero);

        let address = Address::repeat_byte(0x11);
        let first = Identifier::derive(&address, 0);
        let second = Identifier::derive(&address, 1);
        assert_ne!(first, second);
        assert_eq!(first, Identifier::derive(&address, 0));
        assert_eq!(Identifier::parse(&first.to_string()).unwrap(), first);
        assert!(first.identifier().bytes().all(|b| !b.is_ascii_uppercase()));
    }
}
