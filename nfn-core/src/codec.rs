//! Codec boundary between the wire and the forwarding core.
//!
//! The core only ever sees [`Packet`] values; each wire suite supplies a
//! [`WireCodec`]. Only the NDN 2013 TLV suite has a concrete codec here.

use std::time::Duration;

use log::trace;

use crate::name::{Prefix, Suite};
use crate::packets::{Content, ContentDetails, Interest, NdnTlvSelectors, Packet, Selectors};
use crate::tlv::{decode_tlv_sequence, encode_tlv_sequence, peek_type, TlvElement, TlvError};

/// TLV type numbers of the NDN 2013 packet format
pub mod ndn_types {
    pub const INTEREST: u64 = 0x05;
    pub const DATA: u64 = 0x06;
    pub const NAME: u64 = 0x07;
    pub const GENERIC_COMPONENT: u64 = 0x08;
    pub const SELECTORS: u64 = 0x09;
    pub const NONCE: u64 = 0x0A;
    pub const INTEREST_LIFETIME: u64 = 0x0C;
    pub const MIN_SUFFIX_COMPONENTS: u64 = 0x0D;
    pub const MAX_SUFFIX_COMPONENTS: u64 = 0x0E;
    pub const PUBLISHER_PUBLIC_KEY_LOCATOR: u64 = 0x0F;
    pub const EXCLUDE: u64 = 0x10;
    pub const MUST_BE_FRESH: u64 = 0x12;
    pub const META_INFO: u64 = 0x14;
    pub const CONTENT: u64 = 0x15;
    pub const SIGNATURE_INFO: u64 = 0x16;
    pub const SIGNATURE_VALUE: u64 = 0x17;
    pub const FRESHNESS_PERIOD: u64 = 0x19;
    pub const SIGNATURE_TYPE: u64 = 0x1B;
    pub const KEY_LOCATOR: u64 = 0x1C;
    pub const KEY_DIGEST: u64 = 0x1D;
    pub const SEGMENT_COMPONENT: u64 = 0x32;
}

use ndn_types as t;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed TLV: {0}")]
    Tlv(#[from] TlvError),
    #[error("packet type {0:#x} is neither Interest nor Content")]
    NotAPacket(u64),
    #[error("no codec for suite {0}")]
    UnsupportedSuite(Suite),
    #[error("name belongs to suite {found}, codec handles {expected}")]
    WrongSuite { expected: Suite, found: Suite },
}

/// Encoder/decoder for one wire suite
pub trait WireCodec: Send + Sync {
    fn suite(&self) -> Suite;

    fn decode(&self, bytes: &[u8]) -> Result<Packet, CodecError>;

    fn encode_interest(&self, interest: &Interest) -> Result<Vec<u8>, CodecError>;

    fn encode_content(&self, content: &Content) -> Result<Vec<u8>, CodecError>;

    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, CodecError> {
        match packet {
            Packet::Interest(interest) => self.encode_interest(interest),
            Packet::Content(content) => self.encode_content(content),
        }
    }
}

/// Codec for a configured suite
pub fn codec_for(suite: Suite) -> Result<Box<dyn WireCodec>, CodecError> {
    match suite {
        Suite::NdnTlv => Ok(Box::new(NdnTlvCodec)),
        other => Err(CodecError::UnsupportedSuite(other)),
    }
}

/// NDN 2013 TLV codec
#[derive(Debug, Clone, Copy, Default)]
pub struct NdnTlvCodec;

impl NdnTlvCodec {
    fn check_suite(&self, name: &Prefix) -> Result<(), CodecError> {
        if name.suite != Suite::NdnTlv {
            return Err(CodecError::WrongSuite {
                expected: Suite::NdnTlv,
                found: name.suite,
            });
        }
        Ok(())
    }

    fn encode_name(name: &Prefix) -> TlvElement {
        let mut components: Vec<TlvElement> = name
            .components
            .iter()
            .map(|c| TlvElement::new(t::GENERIC_COMPONENT, c.clone()))
            .collect();
        if let Some(chunk) = name.chunk {
            components.push(TlvElement::from_u64(t::SEGMENT_COMPONENT, chunk as u64));
        }
        TlvElement::new(t::NAME, encode_tlv_sequence(&components))
    }

    fn decode_name(value: &[u8]) -> Result<Prefix, CodecError> {
        let mut prefix = Prefix::new(Suite::NdnTlv);
        for element in decode_tlv_sequence(value)? {
            match element.type_ {
                t::SEGMENT_COMPONENT => prefix.chunk = Some(element.as_u32()?),
                // Any other component type is carried as opaque bytes.
                _ => prefix.components.push(element.value),
            }
        }
        prefix.classify();
        Ok(prefix)
    }

    fn encode_selectors(interest: &Interest) -> Option<TlvElement> {
        let s = &interest.selectors;
        let mut elements = Vec::new();
        if let Some(min) = s.min_suffix() {
            elements.push(TlvElement::from_u64(t::MIN_SUFFIX_COMPONENTS, min as u64));
        }
        if let Some(max) = s.max_suffix() {
            elements.push(TlvElement::from_u64(t::MAX_SUFFIX_COMPONENTS, max as u64));
        }
        if let Some(publisher) = s.publisher_filter() {
            let digest = TlvElement::new(t::KEY_DIGEST, publisher.to_vec()).encode();
            elements.push(TlvElement::new(t::PUBLISHER_PUBLIC_KEY_LOCATOR, digest));
        }
        if !s.exclude().is_empty() {
            let excluded: Vec<TlvElement> = s
                .exclude()
                .iter()
                .map(|c| TlvElement::new(t::GENERIC_COMPONENT, c.clone()))
                .collect();
            elements.push(TlvElement::new(t::EXCLUDE, encode_tlv_sequence(&excluded)));
        }
        if s.must_be_fresh() {
            elements.push(TlvElement::new(t::MUST_BE_FRESH, Vec::new()));
        }
        if elements.is_empty() {
            None
        } else {
            Some(TlvElement::new(t::SELECTORS, encode_tlv_sequence(&elements)))
        }
    }

    fn decode_selectors(value: &[u8]) -> Result<NdnTlvSelectors, CodecError> {
        let mut selectors = NdnTlvSelectors::default();
        for element in decode_tlv_sequence(value)? {
            match element.type_ {
                t::MIN_SUFFIX_COMPONENTS => {
                    selectors.min_suffix_components = Some(element.as_u32()?)
                }
                t::MAX_SUFFIX_COMPONENTS => {
                    selectors.max_suffix_components = Some(element.as_u32()?)
                }
                t::PUBLISHER_PUBLIC_KEY_LOCATOR => {
                    let (inner, _) = TlvElement::decode(&element.value)?;
                    selectors.publisher_locator = Some(inner.value);
                }
                t::EXCLUDE => {
                    selectors.exclude = decode_tlv_sequence(&element.value)?
                        .into_iter()
                        .filter(|e| e.type_ == t::GENERIC_COMPONENT)
                        .map(|e| e.value)
                        .collect();
                }
                t::MUST_BE_FRESH => selectors.must_be_fresh = true,
                _ => {}
            }
        }
        Ok(selectors)
    }

    fn decode_interest(&self, value: &[u8]) -> Result<Interest, CodecError> {
        let mut name = None;
        let mut selectors = NdnTlvSelectors::default();
        let mut nonce = None;
        let mut lifetime = None;

        for element in decode_tlv_sequence(value)? {
            match element.type_ {
                t::NAME => name = Some(Self::decode_name(&element.value)?),
                t::SELECTORS => selectors = Self::decode_selectors(&element.value)?,
                t::NONCE => {
                    if let Ok(bytes) = <[u8; 4]>::try_from(element.value.as_slice()) {
                        nonce = Some(u32::from_be_bytes(bytes));
                    }
                }
                t::INTEREST_LIFETIME => {
                    lifetime = Some(Duration::from_millis(element.as_u64()?));
                }
                _ => {}
            }
        }

        let prefix = name.ok_or(TlvError::Missing(t::NAME))?;
        let mut interest = Interest::new(prefix).with_selectors(Selectors::NdnTlv(selectors));
        interest.nonce = nonce;
        interest.lifetime = lifetime;
        Ok(interest)
    }

    fn decode_content(&self, value: &[u8]) -> Result<Content, CodecError> {
        let mut name = None;
        let mut payload = Vec::new();
        let mut freshness = None;
        let mut publisher_locator = None;

        for element in decode_tlv_sequence(value)? {
            match element.type_ {
                t::NAME => name = Some(Self::decode_name(&element.value)?),
                t::META_INFO => {
                    for meta in decode_tlv_sequence(&element.value)? {
                        if meta.type_ == t::FRESHNESS_PERIOD {
                            freshness = Some(Duration::from_millis(meta.as_u64()?));
                        }
                    }
                }
                t::CONTENT => payload = element.value,
                t::SIGNATURE_INFO => {
                    for info in decode_tlv_sequence(&element.value)? {
                        if info.type_ == t::KEY_LOCATOR {
                            let (inner, _) = TlvElement::decode(&info.value)?;
                            publisher_locator = Some(inner.value);
                        }
                    }
                }
                _ => {}
            }
        }

        let name = name.ok_or(TlvError::Missing(t::NAME))?;
        let mut content = Content::new(name, payload)
            .with_details(ContentDetails::NdnTlv { publisher_locator });
        content.freshness = freshness;
        Ok(content)
    }
}

impl WireCodec for NdnTlvCodec {
    fn suite(&self) -> Suite {
        Suite::NdnTlv
    }

    fn decode(&self, bytes: &[u8]) -> Result<Packet, CodecError> {
        let (outer, consumed) = TlvElement::decode(bytes)?;
        if consumed < bytes.len() {
            trace!("ignoring {} trailing bytes after packet", bytes.len() - consumed);
        }
        match outer.type_ {
            t::INTEREST => Ok(Packet::Interest(self.decode_interest(&outer.value)?)),
            t::DATA => Ok(Packet::Content(self.decode_content(&outer.value)?)),
            other => Err(CodecError::NotAPacket(other)),
        }
    }

    fn encode_interest(&self, interest: &Interest) -> Result<Vec<u8>, CodecError> {
        self.check_suite(&interest.prefix)?;
        let mut elements = vec![Self::encode_name(&interest.prefix)];
        if let Some(selectors) = Self::encode_selectors(interest) {
            elements.push(selectors);
        }
        if let Some(nonce) = interest.nonce {
            elements.push(TlvElement::new(t::NONCE, nonce.to_be_bytes().to_vec()));
        }
        if let Some(lifetime) = interest.lifetime {
            elements.push(TlvElement::from_u64(t::INTEREST_LIFETIME, lifetime.as_millis() as u64));
        }
        Ok(TlvElement::new(t::INTEREST, encode_tlv_sequence(&elements)).encode())
    }

    fn encode_content(&self, content: &Content) -> Result<Vec<u8>, CodecError> {
        self.check_suite(&content.name)?;
        let mut elements = vec![Self::encode_name(&content.name)];
        if let Some(freshness) = content.freshness {
            let period = TlvElement::from_u64(t::FRESHNESS_PERIOD, freshness.as_millis() as u64);
            elements.push(TlvElement::new(t::META_INFO, period.encode()));
        }
        elements.push(TlvElement::new(t::CONTENT, content.payload.clone()));

        let mut info = vec![TlvElement::from_u64(t::SIGNATURE_TYPE, 0)];
        if let Some(publisher) = content.publisher() {
            let digest = TlvElement::new(t::KEY_DIGEST, publisher.to_vec()).encode();
            info.push(TlvElement::new(t::KEY_LOCATOR, digest));
        }
        elements.push(TlvElement::new(t::SIGNATURE_INFO, encode_tlv_sequence(&info)));
        elements.push(TlvElement::new(t::SIGNATURE_VALUE, Vec::new()));

        Ok(TlvElement::new(t::DATA, encode_tlv_sequence(&elements)).encode())
    }
}

/// Guess whether a buffer holds an NDN packet, looking only at the outer type
pub fn looks_like_ndn(bytes: &[u8]) -> bool {
    matches!(peek_type(bytes), Ok(t::INTEREST) | Ok(t::DATA))
}
