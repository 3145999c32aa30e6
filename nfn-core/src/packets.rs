use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::name::{Prefix, Suite};

/// Interest selectors of the CCNx binary (ccnb) suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CcnbSelectors {
    pub min_suffix_components: Option<u32>,
    pub max_suffix_components: Option<u32>,
    pub answer_origin_kind: Option<u32>,
    pub publisher_digest: Option<Vec<u8>>,
}

/// Interest selectors of the CCNx 2014 TLV suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CcnTlvSelectors {
    pub key_id: Option<Vec<u8>>,
}

/// Interest selectors of the NDN 2013 TLV suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NdnTlvSelectors {
    pub min_suffix_components: Option<u32>,
    pub max_suffix_components: Option<u32>,
    pub must_be_fresh: bool,
    pub exclude: Vec<Vec<u8>>,
    pub publisher_locator: Option<Vec<u8>>,
}

/// Per-suite Interest selectors. Suites without selectors use `Plain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selectors {
    #[default]
    Plain,
    Ccnb(CcnbSelectors),
    CcnTlv(CcnTlvSelectors),
    NdnTlv(NdnTlvSelectors),
}

impl Selectors {
    /// Empty selector record of the right shape for a suite
    pub fn for_suite(suite: Suite) -> Self {
        match suite {
            Suite::Ccnb => Selectors::Ccnb(CcnbSelectors::default()),
            Suite::CcnTlv => Selectors::CcnTlv(CcnTlvSelectors::default()),
            Suite::NdnTlv => Selectors::NdnTlv(NdnTlvSelectors::default()),
            Suite::IotTlv | Suite::LocalRpc => Selectors::Plain,
        }
    }

    pub fn min_suffix(&self) -> Option<u32> {
        match self {
            Selectors::Ccnb(s) => s.min_suffix_components,
            Selectors::NdnTlv(s) => s.min_suffix_components,
            _ => None,
        }
    }

    pub fn max_suffix(&self) -> Option<u32> {
        match self {
            Selectors::Ccnb(s) => s.max_suffix_components,
            Selectors::NdnTlv(s) => s.max_suffix_components,
            _ => None,
        }
    }

    pub fn must_be_fresh(&self) -> bool {
        matches!(self, Selectors::NdnTlv(s) if s.must_be_fresh)
    }

    pub fn exclude(&self) -> &[Vec<u8>] {
        match self {
            Selectors::NdnTlv(s) => &s.exclude,
            _ => &[],
        }
    }

    /// Publisher identity the Content must carry, whatever the suite calls it
    pub fn publisher_filter(&self) -> Option<&[u8]> {
        match self {
            Selectors::Ccnb(s) => s.publisher_digest.as_deref(),
            Selectors::CcnTlv(s) => s.key_id.as_deref(),
            Selectors::NdnTlv(s) => s.publisher_locator.as_deref(),
            Selectors::Plain => None,
        }
    }
}

/// Per-suite publisher details attached to Content
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentDetails {
    #[default]
    Plain,
    Ccnb { publisher_digest: Option<Vec<u8>> },
    CcnTlv { key_id: Option<Vec<u8>> },
    NdnTlv { publisher_locator: Option<Vec<u8>> },
}

impl ContentDetails {
    pub fn publisher(&self) -> Option<&[u8]> {
        match self {
            ContentDetails::Ccnb { publisher_digest } => publisher_digest.as_deref(),
            ContentDetails::CcnTlv { key_id } => key_id.as_deref(),
            ContentDetails::NdnTlv { publisher_locator } => publisher_locator.as_deref(),
            ContentDetails::Plain => None,
        }
    }
}

/// Request for named data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub prefix: Prefix,
    pub selectors: Selectors,
    pub nonce: Option<u32>,
    pub lifetime: Option<Duration>,
}

impl Interest {
    pub fn new(prefix: Prefix) -> Self {
        let selectors = Selectors::for_suite(prefix.suite);
        Self {
            prefix,
            selectors,
            nonce: None,
            lifetime: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Draw a random nonce if none is set
    pub fn ensure_nonce(&mut self) -> u32 {
        *self.nonce.get_or_insert_with(|| rand::thread_rng().gen())
    }
}

/// Named payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub name: Prefix,
    pub payload: Vec<u8>,
    pub details: ContentDetails,
    pub freshness: Option<Duration>,
}

impl Content {
    pub fn new(name: Prefix, payload: impl Into<Vec<u8>>) -> Self {
        let details = match name.suite {
            Suite::Ccnb => ContentDetails::Ccnb { publisher_digest: None },
            Suite::CcnTlv => ContentDetails::CcnTlv { key_id: None },
            Suite::NdnTlv => ContentDetails::NdnTlv { publisher_locator: None },
            Suite::IotTlv | Suite::LocalRpc => ContentDetails::Plain,
        };
        Self {
            name,
            payload: payload.into(),
            details,
            freshness: None,
        }
    }

    pub fn with_details(mut self, details: ContentDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn publisher(&self) -> Option<&[u8]> {
        self.details.publisher()
    }
}

/// Anything a codec can produce from the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Content(Content),
}

impl Packet {
    pub fn name(&self) -> &Prefix {
        match self {
            Packet::Interest(interest) => &interest.prefix,
            Packet::Content(content) => &content.name,
        }
    }

    pub fn is_interest(&self) -> bool {
        matches!(self, Packet::Interest(_))
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Content> for Packet {
    fn from(content: Content) -> Self {
        Packet::Content(content)
    }
}
