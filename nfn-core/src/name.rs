use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Trailing component that marks a name as a computation request
pub const NFN_MARKER: &[u8] = b"NFN";
/// Component placed before [`NFN_MARKER`] to ask for a deferred result
pub const THUNK_MARKER: &[u8] = b"THUNK";

/// Wire encodings a name or packet can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Suite {
    #[serde(rename = "ccnb")]
    Ccnb,
    #[serde(rename = "ccnx2014")]
    CcnTlv,
    #[serde(rename = "iot2014")]
    IotTlv,
    #[default]
    #[serde(rename = "ndn2013")]
    NdnTlv,
    #[serde(rename = "localrpc")]
    LocalRpc,
}

impl Suite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suite::Ccnb => "ccnb",
            Suite::CcnTlv => "ccnx2014",
            Suite::IotTlv => "iot2014",
            Suite::NdnTlv => "ndn2013",
            Suite::LocalRpc => "localrpc",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ccnb" => Ok(Suite::Ccnb),
            "ccnx2014" | "ccntlv" => Ok(Suite::CcnTlv),
            "iot2014" | "iottlv" => Ok(Suite::IotTlv),
            "ndn2013" | "ndntlv" => Ok(Suite::NdnTlv),
            "localrpc" => Ok(Suite::LocalRpc),
            other => Err(NameParseError::UnknownSuite(other.to_string())),
        }
    }
}

/// Computation markers carried alongside a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NfnFlags {
    /// The trailing components encode a function-application expression
    pub expression: bool,
    /// Caller asked for a placeholder instead of the full result
    pub thunk: bool,
    /// Content under this name was synthesized by the local reducer
    pub computed: bool,
}

/// Hierarchical name: ordered opaque components plus suite, chunk and
/// computation flags. The empty component list is the root name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix {
    pub components: Vec<Vec<u8>>,
    pub suite: Suite,
    pub chunk: Option<u32>,
    pub nfn: NfnFlags,
}

impl Prefix {
    /// Create the root name for a suite
    pub fn new(suite: Suite) -> Self {
        Self {
            components: Vec::new(),
            suite,
            chunk: None,
            nfn: NfnFlags::default(),
        }
    }

    /// Parse a URI such as `/hello/world`. Empty segments are skipped and
    /// `%XX` escapes are decoded into raw bytes.
    pub fn from_uri(uri: &str) -> Result<Self, NameParseError> {
        Self::from_uri_with_suite(uri, Suite::default())
    }

    pub fn from_uri_with_suite(uri: &str, suite: Suite) -> Result<Self, NameParseError> {
        let mut prefix = Prefix::new(suite);
        let body = uri.strip_prefix('/').unwrap_or(uri);
        for part in body.split('/') {
            if !part.is_empty() {
                prefix.components.push(unescape_component(part)?);
            }
        }
        prefix.classify();
        Ok(prefix)
    }

    /// Build a name from raw components
    pub fn from_components<I, C>(components: I, suite: Suite) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let mut prefix = Prefix::new(suite);
        prefix.components = components.into_iter().map(Into::into).collect();
        prefix.classify();
        prefix
    }

    pub fn with_chunk(mut self, chunk: u32) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub fn append(&mut self, component: impl Into<Vec<u8>>) -> &mut Self {
        self.components.push(component.into());
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(Vec::as_slice)
    }

    /// True when every component of `self` equals the component at the same
    /// position in `other`. Bytes are compared without normalization.
    pub fn is_prefix_of(&self, other: &Prefix) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// Number of leading components shared with `other`
    pub fn common_len(&self, other: &Prefix) -> usize {
        self.components
            .iter()
            .zip(other.components.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn get_prefix(&self, length: usize) -> Prefix {
        let mut prefix = Prefix::new(self.suite);
        prefix.components = self.components.iter().take(length).cloned().collect();
        prefix
    }

    /// Recompute the computation flags from the trailing marker components
    pub fn classify(&mut self) {
        let n = self.components.len();
        self.nfn.expression = n > 0 && self.components[n - 1] == NFN_MARKER;
        self.nfn.thunk =
            self.nfn.expression && n > 1 && self.components[n - 2] == THUNK_MARKER;
    }

    pub fn is_expression(&self) -> bool {
        self.nfn.expression
    }

    /// Expression text carried by a computation name: the components before
    /// the markers, joined by single spaces.
    pub fn expression(&self) -> Option<String> {
        if !self.nfn.expression {
            return None;
        }
        let skip = if self.nfn.thunk { 2 } else { 1 };
        let end = self.components.len().saturating_sub(skip);
        let parts: Vec<String> = self.components[..end]
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        Some(parts.join(" "))
    }

    /// URI form, `%XX`-escaping bytes that are not printable ASCII or would
    /// break the path syntax
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            for &b in component {
                if b.is_ascii_graphic() && b != b'/' && b != b'%' {
                    uri.push(b as char);
                } else {
                    uri.push_str(&format!("%{:02X}", b));
                }
            }
        }
        uri
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self::new(Suite::default())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())?;
        if let Some(chunk) = self.chunk {
            write!(f, " [chunk {}]", chunk)?;
        }
        Ok(())
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn unescape_component(part: &str) -> Result<Vec<u8>, NameParseError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => return Err(NameParseError::InvalidEscape(part.to_string())),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("invalid percent escape in component {0:?}")]
    InvalidEscape(String),
    #[error("unknown suite {0:?}")]
    UnknownSuite(String),
}
