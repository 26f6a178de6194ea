//! Generic record model for parsed session descriptions.
//!
//! Lines are not parsed into per-attribute structs. Instead each line rule
//! attaches its captures as a scalar, a record, or an entry in a list,
//! under the rule's key. That keeps parse and write driven by one table
//! and makes unknown attributes a first class citizen (the "invalid"
//! bucket) instead of data loss.

use std::collections::BTreeMap;

/// A captured token: integral if it looks like an integer.
pub use crate::rtp::ParamValue as Value;

/// A named group of captured values, one per capture name of a line rule.
pub type Record = BTreeMap<String, Value>;

/// The value stored under one grammar key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Single value, e.g. `mid` or `setup`.
    Scalar(Value),
    /// One record, e.g. `origin` or `fingerprint`.
    Record(Record),
    /// Repeatable lines, e.g. `rtp` (a=rtpmap) or `candidates`.
    List(Vec<Record>),
}

/// Key/field storage shared by the session and each media section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(BTreeMap<String, Field>);

impl Fields {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.0.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(Field::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// Scalar rendered to text (mids can parse as integers).
    pub fn str_of(&self, key: &str) -> Option<String> {
        self.scalar(key).map(|v| v.to_string())
    }

    pub fn int_of(&self, key: &str) -> Option<i64> {
        self.scalar(key).and_then(|v| v.as_i64())
    }

    pub fn record(&self, key: &str) -> Option<&Record> {
        match self.0.get(key) {
            Some(Field::Record(r)) => Some(r),
            _ => None,
        }
    }

    pub fn record_mut(&mut self, key: &str) -> Option<&mut Record> {
        match self.0.get_mut(key) {
            Some(Field::Record(r)) => Some(r),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&[Record]> {
        match self.0.get(key) {
            Some(Field::List(l)) => Some(l),
            _ => None,
        }
    }

    /// The list under `key`, created empty when absent.
    pub fn list_mut(&mut self, key: &str) -> &mut Vec<Record> {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Field::List(vec![]));
        match entry {
            Field::List(l) => l,
            // A push rule and a name rule never share a key.
            _ => {
                *entry = Field::List(vec![]);
                match entry {
                    Field::List(l) => l,
                    _ => unreachable!(),
                }
            }
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0
            .insert(key.to_string(), Field::Scalar(value.into()));
    }

    pub fn set_record(&mut self, key: &str, record: Record) {
        self.0.insert(key.to_string(), Field::Record(record));
    }

    pub fn push_record(&mut self, key: &str, record: Record) {
        self.list_mut(key).push(record);
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }
}

/// One m= section with everything attached under it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdpMedia {
    /// Attached fields, the m= line values included (`type`, `port`,
    /// `protocol`, `payloads` are plain scalars here).
    pub fields: Fields,
}

impl SdpMedia {
    /// A fresh media section. The rtp/fmtp lists always exist, matching
    /// what parsing produces.
    pub fn new() -> SdpMedia {
        let mut media = SdpMedia::default();
        media.fields.list_mut("rtp");
        media.fields.list_mut("fmtp");
        media
    }

    /// Media type from the m= line ("audio", "video", "application").
    pub fn typ(&self) -> Option<String> {
        self.fields.str_of("type")
    }

    /// The a=mid value, rendered to text.
    pub fn mid(&self) -> Option<String> {
        self.fields.str_of("mid")
    }

    pub fn port(&self) -> Option<i64> {
        self.fields.int_of("port")
    }

    /// A section closed by setting its port to 0.
    pub fn closed(&self) -> bool {
        self.port() == Some(0)
    }
}

/// A parsed (or under construction) session description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdpSession {
    /// Session level fields.
    pub fields: Fields,
    /// Media sections in order of appearance.
    pub media: Vec<SdpMedia>,
}

impl SdpSession {
    /// The first media section carrying the given mid.
    pub fn media_by_mid(&self, mid: &str) -> Option<&SdpMedia> {
        self.media.iter().find(|m| m.mid().as_deref() == Some(mid))
    }

    /// Mutable variant of [`SdpSession::media_by_mid`].
    pub fn media_by_mid_mut(&mut self, mid: &str) -> Option<&mut SdpMedia> {
        self.media
            .iter_mut()
            .find(|m| m.mid().as_deref() == Some(mid))
    }
}
