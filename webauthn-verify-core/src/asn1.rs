//! A generic BER/DER node tree.
//!
//! Attestation certificates carry vendor extensions (android key attestation records, apple
//! nonces, the fido aaguid) that the crypto provider does not decode for us. Identifier and
//! length octets, and the values of primitive types, are decoded by `der_parser`. This module
//! assembles them into a tree where context tagged fields can be walked the same way as
//! sequences. The input is attacker controlled, so every declared length is checked against the
//! bytes remaining before descending, and nesting depth is bounded.

use der_parser::ber::{
    ber_read_element_header, parse_ber_recursive, BerObject, BerObjectContent, Class, Length,
};
use der_parser::oid::Oid;

use crate::error::{WebauthnError, WebauthnResult};

/// The maximum nesting depth the reader will descend to.
const MAX_DEPTH: usize = 32;

/// Universal tag numbers used by this crate.
pub mod tag {
    /// BOOLEAN
    pub const BOOLEAN: u32 = 1;
    /// INTEGER
    pub const INTEGER: u32 = 2;
    /// BIT STRING
    pub const BIT_STRING: u32 = 3;
    /// OCTET STRING
    pub const OCTET_STRING: u32 = 4;
    /// OBJECT IDENTIFIER
    pub const OBJECT_IDENTIFIER: u32 = 6;
    /// ENUMERATED
    pub const ENUMERATED: u32 = 10;
    /// SEQUENCE and SEQUENCE OF
    pub const SEQUENCE: u32 = 16;
    /// SET and SET OF
    pub const SET: u32 = 17;
}

/// The value of a node, either a decoded primitive or the decoded children.
#[derive(Debug, Clone, PartialEq)]
pub enum Asn1Value<'a> {
    /// A primitive encoding, as decoded by `der_parser`.
    Primitive(BerObject<'a>),
    /// Children of a constructed encoding.
    Constructed(Vec<Asn1Node<'a>>),
}

/// A decoded TLV node.
#[derive(Debug, Clone, PartialEq)]
pub struct Asn1Node<'a> {
    /// The tag class.
    pub class: Class,
    /// If this is a constructed encoding.
    pub constructed: bool,
    /// The tag number.
    pub tag: u32,
    /// The declared content length. `None` for the indefinite length form.
    pub length: Option<usize>,
    /// The content.
    pub value: Asn1Value<'a>,
}

fn asn1_error<E: std::fmt::Debug>(e: E) -> WebauthnError {
    debug!(?e, "asn.1 decoding failed");
    WebauthnError::DataConversion(format!("asn.1: {e:?}"))
}

fn split_checked(input: &[u8], n: usize) -> WebauthnResult<(&[u8], &[u8])> {
    if n > input.len() {
        debug!(declared = n, remaining = input.len(), "asn.1 length overrun");
        return Err(asn1_error("declared length exceeds remaining bytes"));
    }
    Ok(input.split_at(n))
}

fn parse_children(mut cursor: &[u8], depth: usize) -> WebauthnResult<Vec<Asn1Node<'_>>> {
    let mut children = Vec::new();
    while !cursor.is_empty() {
        let (child, rest) = parse_node(cursor, depth + 1)?;
        children.push(child);
        cursor = rest;
    }
    Ok(children)
}

fn parse_node(input: &[u8], depth: usize) -> WebauthnResult<(Asn1Node<'_>, &[u8])> {
    if depth > MAX_DEPTH {
        return Err(asn1_error("maximum nesting depth exceeded"));
    }

    let (rest, header) = ber_read_element_header(input).map_err(asn1_error)?;
    let class = header.class();
    let constructed = header.is_constructed();
    let tag = header.tag().0;

    match header.length() {
        Length::Definite(len) => {
            let (contents, rest) = split_checked(rest, len)?;
            let value = if constructed {
                Asn1Value::Constructed(parse_children(contents, depth)?)
            } else {
                // Decode the primitive from exactly its own encoding.
                let encoded = input
                    .get(..input.len() - rest.len())
                    .ok_or_else(|| asn1_error("truncated value"))?;
                let (trailing, object) = parse_ber_recursive(encoded, 1).map_err(asn1_error)?;
                if !trailing.is_empty() {
                    return Err(asn1_error("primitive value did not consume its length"));
                }
                Asn1Value::Primitive(object)
            };
            Ok((
                Asn1Node {
                    class,
                    constructed,
                    tag,
                    length: Some(len),
                    value,
                },
                rest,
            ))
        }
        Length::Indefinite => {
            if !constructed {
                return Err(asn1_error("indefinite length on a primitive encoding"));
            }
            let mut children = Vec::new();
            let mut cursor = rest;
            loop {
                if cursor.starts_with(&[0x00, 0x00]) {
                    // end-of-contents
                    let (_, r) = split_checked(cursor, 2)?;
                    cursor = r;
                    break;
                }
                if cursor.is_empty() {
                    return Err(asn1_error("missing end-of-contents"));
                }
                let (child, r) = parse_node(cursor, depth + 1)?;
                children.push(child);
                cursor = r;
            }
            Ok((
                Asn1Node {
                    class,
                    constructed,
                    tag,
                    length: None,
                    value: Asn1Value::Constructed(children),
                },
                cursor,
            ))
        }
    }
}

/// Parse exactly one node, failing if any bytes remain after it.
pub fn parse(input: &[u8]) -> WebauthnResult<Asn1Node<'_>> {
    let (node, rest) = parse_node(input, 0)?;
    if !rest.is_empty() {
        return Err(asn1_error("trailing bytes after value"));
    }
    Ok(node)
}

/// Parse one node from the front of the input, returning the bytes that follow it.
pub fn parse_prefix(input: &[u8]) -> WebauthnResult<(Asn1Node<'_>, &[u8])> {
    parse_node(input, 0)
}

impl<'a> Asn1Node<'a> {
    /// If this node is the universal type `tag`.
    pub fn is_universal(&self, tag: u32) -> bool {
        self.class == Class::Universal && self.tag == tag
    }

    /// If this node is the context specific tag `[tag]`.
    pub fn is_context(&self, tag: u32) -> bool {
        self.class == Class::ContextSpecific && self.tag == tag
    }

    /// The children of a constructed node.
    pub fn children(&self) -> WebauthnResult<&[Asn1Node<'a>]> {
        match &self.value {
            Asn1Value::Constructed(c) => Ok(c.as_slice()),
            Asn1Value::Primitive(_) => Err(asn1_error("expected a constructed value")),
        }
    }

    /// The child at `idx` of a constructed node.
    pub fn child(&self, idx: usize) -> WebauthnResult<&Asn1Node<'a>> {
        self.children()?
            .get(idx)
            .ok_or_else(|| asn1_error("missing element"))
    }

    /// The first child that carries context specific tag `[tag]`.
    pub fn find_context(&self, tag: u32) -> WebauthnResult<Option<&Asn1Node<'a>>> {
        Ok(self.children()?.iter().find(|c| c.is_context(tag)))
    }

    /// The decoded object of a primitive node.
    pub fn primitive(&self) -> WebauthnResult<&BerObject<'a>> {
        match &self.value {
            Asn1Value::Primitive(p) => Ok(p),
            Asn1Value::Constructed(_) => Err(asn1_error("expected a primitive value")),
        }
    }

    /// Decode a non-negative INTEGER or ENUMERATED that fits in 64 bits.
    pub fn as_u64(&self) -> WebauthnResult<u64> {
        if !(self.is_universal(tag::INTEGER) || self.is_universal(tag::ENUMERATED)) {
            return Err(asn1_error("expected an integer"));
        }
        self.primitive()?.as_u64().map_err(asn1_error)
    }

    /// Decode a BOOLEAN.
    pub fn as_bool(&self) -> WebauthnResult<bool> {
        if !self.is_universal(tag::BOOLEAN) {
            return Err(asn1_error("expected a boolean"));
        }
        self.primitive()?.as_bool().map_err(asn1_error)
    }

    /// The content of an OCTET STRING.
    pub fn as_octet_string(&self) -> WebauthnResult<&'a [u8]> {
        if !self.is_universal(tag::OCTET_STRING) {
            return Err(asn1_error("expected an octet string"));
        }
        self.primitive()?.as_slice().map_err(asn1_error)
    }

    /// The content of a BIT STRING with no unused bits.
    pub fn as_bit_string(&self) -> WebauthnResult<&'a [u8]> {
        if !self.is_universal(tag::BIT_STRING) {
            return Err(asn1_error("expected a bit string"));
        }
        match &self.primitive()?.content {
            BerObjectContent::BitString(0, bits) => Ok(bits.data),
            BerObjectContent::BitString(..) => Err(asn1_error("bit string with unused bits")),
            _ => Err(asn1_error("expected a bit string")),
        }
    }

    /// Decode an OBJECT IDENTIFIER.
    pub fn as_oid(&self) -> WebauthnResult<&Oid<'a>> {
        if !self.is_universal(tag::OBJECT_IDENTIFIER) {
            return Err(asn1_error("expected an object identifier"));
        }
        self.primitive()?.as_oid().map_err(asn1_error)
    }
}

/// The subjectPublicKey bits of a DER encoded SubjectPublicKeyInfo.
pub fn subject_public_key_bits(spki_der: &[u8]) -> WebauthnResult<&[u8]> {
    parse(spki_der)?.child(1)?.as_bit_string()
}
