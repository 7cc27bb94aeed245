//! Bit layout of the embedded payload.
//!
//! ```text
//! width:16 | height:16 | len:8 pubkey | len:8 salt | len:8 hash | len:8 nonce | len:8 tag | len:32 ciphertext
//! ```
//!
//! Each variable field is preceded by its byte count. Parsing is strictly
//! sequential: a length has to be read before the field it gates can be located.

use thiserror::Error;

use crate::bits::{self, BitsError};
use crate::config;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("{field:?}: {source}")]
    ValueOutOfRange {
        field: FieldKind,
        #[source]
        source: BitsError,
    },
    #[error("{field:?}: {source}")]
    MalformedLength {
        field: FieldKind,
        #[source]
        source: BitsError,
    },
    #[error("payload already fully parsed")]
    AlreadyComplete,
}

/// Fields in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    SecretWidth,
    SecretHeight,
    PubkeyLen,
    Pubkey,
    SaltLen,
    Salt,
    HashLen,
    Hash,
    NonceLen,
    Nonce,
    TagLen,
    Tag,
    CiphertextLen,
    Ciphertext,
}

impl FieldKind {
    pub const FIRST: FieldKind = FieldKind::SecretWidth;

    pub fn next(self) -> Option<FieldKind> {
        use FieldKind::*;
        match self {
            SecretWidth => Some(SecretHeight),
            SecretHeight => Some(PubkeyLen),
            PubkeyLen => Some(Pubkey),
            Pubkey => Some(SaltLen),
            SaltLen => Some(Salt),
            Salt => Some(HashLen),
            HashLen => Some(Hash),
            Hash => Some(NonceLen),
            NonceLen => Some(Nonce),
            Nonce => Some(TagLen),
            TagLen => Some(Tag),
            Tag => Some(CiphertextLen),
            CiphertextLen => Some(Ciphertext),
            Ciphertext => None,
        }
    }

    /// Width of integer fields. Byte fields return `None`; their width is
    /// eight times the value of the length field before them.
    pub fn fixed_width(self) -> Option<usize> {
        use FieldKind::*;
        match self {
            SecretWidth | SecretHeight => Some(config::DIMENSION_BITS),
            PubkeyLen | SaltLen | HashLen | NonceLen | TagLen => Some(config::SHORT_LEN_BITS),
            CiphertextLen => Some(config::CIPHERTEXT_LEN_BITS),
            Pubkey | Salt | Hash | Nonce | Tag | Ciphertext => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(u64),
    Bytes(Vec<u8>),
}

/// Outcome of trying to parse one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStep {
    Parsed {
        kind: FieldKind,
        value: FieldValue,
        cursor: usize,
    },
    NeedMoreBits {
        kind: FieldKind,
        need: usize,
        have: usize,
    },
}

/// Everything carried in the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub width: u32,
    pub height: u32,
    pub ephemeral_pubkey: Vec<u8>,
    pub salt: Vec<u8>,
    pub image_hash: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Total payload bits for a ciphertext of `ciphertext_len` bytes when every
/// other field has its standard length.
pub fn payload_bits(ciphertext_len: usize) -> usize {
    config::STANDARD_HEADER_BITS + ciphertext_len * 8
}

/// Serialize an envelope into its payload bit string.
pub fn serialize(env: &Envelope) -> Result<Vec<bool>, PacketError> {
    let total = 2 * config::DIMENSION_BITS
        + 5 * config::SHORT_LEN_BITS
        + config::CIPHERTEXT_LEN_BITS
        + 8 * (env.ephemeral_pubkey.len()
            + env.salt.len()
            + env.image_hash.len()
            + env.nonce.len()
            + env.tag.len()
            + env.ciphertext.len());
    let mut out = Vec::with_capacity(total);

    push_uint(&mut out, FieldKind::SecretWidth, env.width as u64)?;
    push_uint(&mut out, FieldKind::SecretHeight, env.height as u64)?;
    push_prefixed(&mut out, FieldKind::PubkeyLen, &env.ephemeral_pubkey)?;
    push_prefixed(&mut out, FieldKind::SaltLen, &env.salt)?;
    push_prefixed(&mut out, FieldKind::HashLen, &env.image_hash)?;
    push_prefixed(&mut out, FieldKind::NonceLen, &env.nonce)?;
    push_prefixed(&mut out, FieldKind::TagLen, &env.tag)?;
    push_prefixed(&mut out, FieldKind::CiphertextLen, &env.ciphertext)?;

    Ok(out)
}

fn push_uint(out: &mut Vec<bool>, field: FieldKind, value: u64) -> Result<(), PacketError> {
    let width = field.fixed_width().unwrap_or(0);
    bits::push_uint(out, value, width)
        .map_err(|source| PacketError::ValueOutOfRange { field, source })
}

fn push_prefixed(out: &mut Vec<bool>, len_field: FieldKind, data: &[u8]) -> Result<(), PacketError> {
    push_uint(out, len_field, data.len() as u64)?;
    bits::push_bytes(out, data);
    Ok(())
}

/// Parse field `kind` starting at `cursor`.
///
/// `declared_len` is the byte count read from the preceding length field and
/// is ignored for integer fields.
pub fn parse_field(
    bits: &[bool],
    cursor: usize,
    kind: FieldKind,
    declared_len: usize,
) -> Result<ParseStep, PacketError> {
    let width = kind.fixed_width().unwrap_or(declared_len * 8);
    let have = bits.len().saturating_sub(cursor);
    if have < width {
        return Ok(ParseStep::NeedMoreBits {
            kind,
            need: width,
            have,
        });
    }

    let slice = &bits[cursor..cursor + width];
    let value = if kind.fixed_width().is_some() {
        let v = bits::bits_to_uint(slice)
            .map_err(|source| PacketError::ValueOutOfRange { field: kind, source })?;
        FieldValue::Uint(v)
    } else {
        let bytes = bits::bits_to_bytes_strict(slice)
            .map_err(|source| PacketError::MalformedLength { field: kind, source })?;
        FieldValue::Bytes(bytes)
    };

    Ok(ParseStep::Parsed {
        kind,
        value,
        cursor: cursor + width,
    })
}

/// Incremental parser over a growing bit accumulator.
///
/// The accumulator may be extended between calls; the parser remembers the
/// cursor and the last length it read.
#[derive(Debug, Clone)]
pub struct HeaderParser {
    next: Option<FieldKind>,
    cursor: usize,
    pending_len: usize,
    ciphertext_len: Option<usize>,
    env: Envelope,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    pub fn new() -> Self {
        Self {
            next: Some(FieldKind::FIRST),
            cursor: 0,
            pending_len: 0,
            ciphertext_len: None,
            env: Envelope::default(),
        }
    }

    /// Bit offset of the next unparsed field.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The next field to parse, or `None` once the ciphertext has been read.
    pub fn next_field(&self) -> Option<FieldKind> {
        self.next
    }

    /// All fields through the ciphertext length have been parsed.
    pub fn header_complete(&self) -> bool {
        matches!(self.next, Some(FieldKind::Ciphertext) | None)
    }

    pub fn is_complete(&self) -> bool {
        self.next.is_none()
    }

    /// The partially filled envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.env
    }

    /// Bits the next field occupies, once its width is known.
    pub fn next_field_bits(&self) -> Option<usize> {
        self.next
            .map(|kind| kind.fixed_width().unwrap_or(self.pending_len * 8))
    }

    /// Ciphertext byte count declared by the header, once parsed.
    pub fn declared_ciphertext_len(&self) -> Option<usize> {
        self.ciphertext_len
    }

    /// The field the parser is waiting on, its width in bits and the bits
    /// available for it in `bits`.
    pub fn pending(&self, bits: &[bool]) -> Option<(FieldKind, usize, usize)> {
        let kind = self.next?;
        let need = self.next_field_bits()?;
        Some((kind, need, bits.len().saturating_sub(self.cursor)))
    }

    /// Try to parse exactly one field.
    pub fn parse_incremental(&mut self, bits: &[bool]) -> Result<ParseStep, PacketError> {
        let kind = self.next.ok_or(PacketError::AlreadyComplete)?;
        let step = parse_field(bits, self.cursor, kind, self.pending_len)?;
        if let ParseStep::Parsed { value, cursor, .. } = &step {
            self.store(kind, value.clone());
            self.cursor = *cursor;
            self.next = kind.next();
        }
        Ok(step)
    }

    /// Parse as many fields as the accumulator allows. Returns the number parsed.
    pub fn parse_available(&mut self, bits: &[bool]) -> Result<usize, PacketError> {
        let mut parsed = 0;
        while self.next.is_some() {
            match self.parse_incremental(bits)? {
                ParseStep::Parsed { .. } => parsed += 1,
                ParseStep::NeedMoreBits { .. } => break,
            }
        }
        Ok(parsed)
    }

    /// The fully parsed envelope, if the ciphertext has been read.
    pub fn finish(self) -> Option<Envelope> {
        if self.is_complete() {
            Some(self.env)
        } else {
            None
        }
    }

    fn store(&mut self, kind: FieldKind, value: FieldValue) {
        use FieldKind::*;
        match value {
            FieldValue::Uint(v) => match kind {
                SecretWidth => self.env.width = v as u32,
                SecretHeight => self.env.height = v as u32,
                CiphertextLen => {
                    self.ciphertext_len = Some(v as usize);
                    self.pending_len = v as usize;
                }
                _ => self.pending_len = v as usize,
            },
            FieldValue::Bytes(b) => {
                self.pending_len = 0;
                match kind {
                    Pubkey => self.env.ephemeral_pubkey = b,
                    Salt => self.env.salt = b,
                    Hash => self.env.image_hash = b,
                    Nonce => self.env.nonce = b,
                    Tag => self.env.tag = b,
                    _ => self.env.ciphertext = b,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> Envelope {
        Envelope {
            width: 32,
            height: 24,
            ephemeral_pubkey: vec![0x02; 33],
            salt: (0..16).collect(),
            image_hash: vec![0xAB; 32],
            nonce: vec![0x11; 12],
            tag: vec![0x22; 16],
            ciphertext: (0..=200).collect(),
        }
    }

    #[test]
    fn test_serialize_layout() {
        let env = sample_envelope();
        let bits = serialize(&env).unwrap();
        assert_eq!(bits.len(), payload_bits(env.ciphertext.len()));

        assert_eq!(bits::bits_to_uint(&bits[0..16]).unwrap(), 32);
        assert_eq!(bits::bits_to_uint(&bits[16..32]).unwrap(), 24);
        assert_eq!(bits::bits_to_uint(&bits[32..40]).unwrap(), 33);
        // ciphertext length sits right after the standard header fields
        let len_start = config::STANDARD_HEADER_BITS - config::CIPHERTEXT_LEN_BITS;
        assert_eq!(
            bits::bits_to_uint(&bits[len_start..config::STANDARD_HEADER_BITS]).unwrap(),
            201
        );
    }

    #[test]
    fn test_parse_complete_stream() {
        let env = sample_envelope();
        let bits = serialize(&env).unwrap();

        let mut parser = HeaderParser::new();
        assert_eq!(parser.parse_available(&bits).unwrap(), 14);
        assert!(parser.is_complete());
        assert_eq!(parser.cursor(), bits.len());
        assert_eq!(parser.finish().unwrap(), env);
    }

    #[test]
    fn test_parse_across_growing_accumulator() {
        let env = sample_envelope();
        let bits = serialize(&env).unwrap();
        let mut parser = HeaderParser::new();

        // Feed in uneven slices, as frames of different capacity would.
        let mut fed = 0;
        for step in [7usize, 100, 300, 569, 1000, 5000] {
            fed = (fed + step).min(bits.len());
            parser.parse_available(&bits[..fed]).unwrap();
            assert!(parser.cursor() <= fed);
        }
        assert!(parser.is_complete());
        assert_eq!(parser.finish().unwrap(), env);
    }

    #[test]
    fn test_need_more_bits_reports_field() {
        let bits = serialize(&sample_envelope()).unwrap();
        let mut parser = HeaderParser::new();

        let step = parser.parse_incremental(&bits[..10]).unwrap();
        assert_eq!(
            step,
            ParseStep::NeedMoreBits {
                kind: FieldKind::SecretWidth,
                need: 16,
                have: 10
            }
        );
        assert_eq!(parser.cursor(), 0);

        parser.parse_available(&bits[..50]).unwrap();
        assert_eq!(parser.next_field(), Some(FieldKind::Pubkey));
        assert_eq!(parser.next_field_bits(), Some(33 * 8));
        assert!(!parser.header_complete());
    }

    #[test]
    fn test_header_complete_before_ciphertext() {
        let bits = serialize(&sample_envelope()).unwrap();
        let mut parser = HeaderParser::new();
        parser
            .parse_available(&bits[..config::STANDARD_HEADER_BITS])
            .unwrap();
        assert!(parser.header_complete());
        assert!(!parser.is_complete());
        assert_eq!(parser.next_field(), Some(FieldKind::Ciphertext));
        assert_eq!(parser.next_field_bits(), Some(201 * 8));
        assert_eq!(parser.declared_ciphertext_len(), Some(201));
        assert_eq!(parser.envelope().nonce, vec![0x11; 12]);
    }

    #[test]
    fn test_field_width_overflow() {
        let mut env = sample_envelope();
        env.ephemeral_pubkey = vec![0u8; 256];
        assert!(matches!(
            serialize(&env),
            Err(PacketError::ValueOutOfRange {
                field: FieldKind::PubkeyLen,
                ..
            })
        ));

        let mut out = Vec::new();
        assert!(matches!(
            push_uint(&mut out, FieldKind::CiphertextLen, 1 << 32),
            Err(PacketError::ValueOutOfRange {
                field: FieldKind::CiphertextLen,
                ..
            })
        ));
        assert!(push_uint(&mut out, FieldKind::CiphertextLen, u32::MAX as u64).is_ok());

        let mut env = sample_envelope();
        env.width = 1 << 16;
        assert!(matches!(
            serialize(&env),
            Err(PacketError::ValueOutOfRange {
                field: FieldKind::SecretWidth,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_ciphertext() {
        let mut env = sample_envelope();
        env.ciphertext.clear();
        let bits = serialize(&env).unwrap();
        let mut parser = HeaderParser::new();
        parser.parse_available(&bits).unwrap();
        assert_eq!(parser.finish().unwrap(), env);
    }

    #[test]
    fn test_parse_after_complete_errors() {
        let bits = serialize(&sample_envelope()).unwrap();
        let mut parser = HeaderParser::new();
        parser.parse_available(&bits).unwrap();
        assert_eq!(
            parser.parse_incremental(&bits),
            Err(PacketError::AlreadyComplete)
        );
    }
}
