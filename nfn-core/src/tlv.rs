use std::io::{self, Write};

/// TLV element using NDN variable-length numbers for both type and length.
///
/// Var-number format (big-endian):
/// - `< 253`: 1 byte
/// - `0xFD` + 2 bytes
/// - `0xFE` + 4 bytes
/// - `0xFF` + 8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u64,
    pub value: Vec<u8>,
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum TlvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("buffer too short")]
    BufferTooShort,
    #[error("unexpected TLV type: {0:#x}")]
    InvalidType(u64),
    #[error("missing TLV element: {0:#x}")]
    Missing(u64),
    #[error("non-negative integer of invalid width {0}")]
    InvalidInteger(usize),
}

impl TlvElement {
    pub fn new(type_: u64, value: Vec<u8>) -> Self {
        Self { type_, value }
    }

    /// Element carrying a non-negative integer in its shortest width
    pub fn from_u64(type_: u64, n: u64) -> Self {
        Self::new(type_, encode_nonneg(n))
    }

    pub fn encoded_length(&self) -> usize {
        var_number_size(self.type_) + var_number_size(self.value.len() as u64) + self.value.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        // Writing into a Vec cannot fail.
        let _ = self.encode_to(&mut buffer);
        buffer
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<(), TlvError> {
        write_var_number(self.type_, writer)?;
        write_var_number(self.value.len() as u64, writer)?;
        writer.write_all(&self.value)?;
        Ok(())
    }

    /// Decode one element, returning it and the number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (type_, mut offset) = read_var_number(data)?;
        let (length, length_bytes) = read_var_number(&data[offset..])?;
        offset += length_bytes;

        let length = usize::try_from(length).map_err(|_| TlvError::BufferTooShort)?;
        let end = offset.checked_add(length).ok_or(TlvError::BufferTooShort)?;
        if data.len() < end {
            return Err(TlvError::BufferTooShort);
        }
        Ok((TlvElement::new(type_, data[offset..end].to_vec()), end))
    }

    /// Interpret the value as a big-endian non-negative integer
    pub fn as_u64(&self) -> Result<u64, TlvError> {
        decode_nonneg(&self.value)
    }

    /// Non-negative integer that must fit 32 bits
    pub fn as_u32(&self) -> Result<u32, TlvError> {
        u32::try_from(self.as_u64()?).map_err(|_| TlvError::InvalidInteger(self.value.len()))
    }
}

/// Peek the outer type of an encoded element without decoding its body
pub fn peek_type(data: &[u8]) -> Result<u64, TlvError> {
    read_var_number(data).map(|(t, _)| t)
}

fn var_number_size(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= u16::MAX as u64 {
        3
    } else if n <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

fn write_var_number<W: Write>(n: u64, writer: &mut W) -> Result<(), TlvError> {
    if n < 253 {
        writer.write_all(&[n as u8])?;
    } else if n <= u16::MAX as u64 {
        writer.write_all(&[0xFD])?;
        writer.write_all(&(n as u16).to_be_bytes())?;
    } else if n <= u32::MAX as u64 {
        writer.write_all(&[0xFE])?;
        writer.write_all(&(n as u32).to_be_bytes())?;
    } else {
        writer.write_all(&[0xFF])?;
        writer.write_all(&n.to_be_bytes())?;
    }
    Ok(())
}

fn read_var_number(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::BufferTooShort)?;
    let width = match first {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        n => return Ok((n as u64, 1)),
    };
    let bytes = data.get(1..1 + width).ok_or(TlvError::BufferTooShort)?;
    let n = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    Ok((n, 1 + width))
}

fn encode_nonneg(n: u64) -> Vec<u8> {
    if n <= u8::MAX as u64 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u32::MAX as u64 {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

fn decode_nonneg(value: &[u8]) -> Result<u64, TlvError> {
    match value.len() {
        1 | 2 | 4 | 8 => Ok(value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)),
        n => Err(TlvError::InvalidInteger(n)),
    }
}

/// Encode multiple TLV elements back to back
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Vec<u8> {
    let total_size = elements.iter().map(TlvElement::encoded_length).sum();
    let mut buffer = Vec::with_capacity(total_size);
    for element in elements {
        let _ = element.encode_to(&mut buffer);
    }
    buffer
}

/// Decode a buffer that holds nothing but TLV elements
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut elements = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (element, consumed) = TlvElement::decode(&data[offset..])?;
        elements.push(element);
        offset += consumed;
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_encoding() {
        let element = TlvElement::new(1, vec![0x01, 0x02, 0x03]);
        assert_eq!(element.encode(), vec![1, 3, 0x01, 0x02, 0x03]);

        let (decoded, consumed) = TlvElement::decode(&[1, 3, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(decoded, element);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_long_length_is_big_endian() {
        let element = TlvElement::new(0x15, vec![0xAA; 300]);
        let encoded = element.encode();
        assert_eq!(&encoded[..4], &[0x15, 0xFD, 0x01, 0x2C]);
        let (decoded, consumed) = TlvElement::decode(&encoded).unwrap();
        assert_eq!(decoded.value.len(), 300);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_wide_type_number() {
        let element = TlvElement::new(0x0320, vec![7]);
        let encoded = element.encode();
        assert_eq!(&encoded[..3], &[0xFD, 0x03, 0x20]);
        assert_eq!(peek_type(&encoded).unwrap(), 0x0320);
    }

    #[test]
    fn test_buffer_too_short() {
        assert!(matches!(TlvElement::decode(&[1, 5, 0x01, 0x02]), Err(TlvError::BufferTooShort)));
        assert!(matches!(TlvElement::decode(&[]), Err(TlvError::BufferTooShort)));
        assert!(matches!(TlvElement::decode(&[0xFD, 0x01]), Err(TlvError::BufferTooShort)));
    }

    #[test]
    fn test_nonneg_integers() {
        assert_eq!(TlvElement::from_u64(0x0A, 7).value, vec![7]);
        assert_eq!(TlvElement::from_u64(0x0A, 300).value, vec![0x01, 0x2C]);
        assert_eq!(TlvElement::from_u64(0x0A, 70_000).as_u64().unwrap(), 70_000);
        assert!(TlvElement::new(0x0A, vec![1, 2, 3]).as_u64().is_err());
    }

    #[test]
    fn test_sequence() {
        let elements = vec![
            TlvElement::new(1, vec![0x01]),
            TlvElement::new(2, vec![0x02, 0x03]),
            TlvElement::new(3, vec![]),
        ];
        let encoded = encode_tlv_sequence(&elements);
        assert_eq!(decode_tlv_sequence(&encoded).unwrap(), elements);
    }
}
