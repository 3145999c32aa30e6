use log::info;

pub mod codec;
pub mod name;
pub mod packets;
pub mod tlv;

pub use codec::{codec_for, CodecError, NdnTlvCodec, WireCodec};
pub use name::{NameParseError, NfnFlags, Prefix, Suite, NFN_MARKER, THUNK_MARKER};
pub use packets::{
    CcnTlvSelectors, CcnbSelectors, Content, ContentDetails, Interest, NdnTlvSelectors, Packet,
    Selectors,
};
pub use tlv::{TlvElement, TlvError};

pub fn init() {
    info!("NFN core initialized");
}
