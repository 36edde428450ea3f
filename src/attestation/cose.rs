//! COSE_Sign1 decoding and signature verification (RFC 9052).

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};
use tracing::debug;

use super::key::VerifierKey;
use super::CoseError;

/// CBOR tag that may precede a COSE_Sign1 array.
pub const COSE_SIGN1_TAG: u64 = 18;

/// Context string of the Signature1 to-be-signed structure.
pub const SIGNATURE1_CONTEXT: &str = "Signature1";

/// Borrowed view of a decoded COSE_Sign1 envelope.
///
/// The unprotected header is skipped; nothing in it is covered by the
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoseSign1<'a> {
    /// Serialized protected header map, exactly as signed.
    pub protected: &'a [u8],
    pub payload: &'a [u8],
    pub signature: &'a [u8],
}

impl<'a> CoseSign1<'a> {
    /// Decode `[protected, unprotected, payload, signature]`, optionally
    /// wrapped in tag 18. Trailing bytes are rejected.
    pub fn decode(input: &'a [u8]) -> Result<Self, CoseError> {
        let malformed = |what: &str| CoseError::MalformedCoseStructure(what.to_string());
        let cbor = |e: minicbor::decode::Error| CoseError::MalformedCoseStructure(e.to_string());

        if input.is_empty() {
            return Err(malformed("empty input"));
        }
        let mut dec = Decoder::new(input);

        if dec.datatype().map_err(cbor)? == Type::Tag {
            let tag = dec.tag().map_err(cbor)?;
            if tag != Tag::Unassigned(COSE_SIGN1_TAG) {
                return Err(malformed("unexpected CBOR tag"));
            }
        }

        let len = dec
            .array()
            .map_err(cbor)?
            .ok_or_else(|| malformed("indefinite-length array"))?;
        if len != 4 {
            return Err(CoseError::MalformedCoseStructure(format!(
                "expected 4 elements, found {len}"
            )));
        }

        let protected = dec.bytes().map_err(cbor)?;
        dec.skip().map_err(cbor)?;
        let payload = match dec.datatype().map_err(cbor)? {
            Type::Bytes => dec.bytes().map_err(cbor)?,
            _ => return Err(malformed("payload is not a byte string")),
        };
        let signature = dec.bytes().map_err(cbor)?;

        if dec.position() != input.len() {
            return Err(malformed("trailing bytes after COSE_Sign1"));
        }

        Ok(Self {
            protected,
            payload,
            signature,
        })
    }

    /// Canonical `["Signature1", protected, h'', payload]` encoding.
    pub fn sig_structure(&self) -> Result<Vec<u8>, CoseError> {
        encode_sig_structure(self.protected, self.payload)
    }

    /// Check the envelope signature against `key`.
    ///
    /// The signature is `r || s`, split into equal halves.
    pub fn verify(&self, key: &VerifierKey) -> Result<(), CoseError> {
        if self.signature.len() % 2 != 0 {
            return Err(CoseError::InvalidSignatureLength(self.signature.len()));
        }
        let ec_key = key.ec_key()?;
        let tbs = self.sig_structure()?;
        let (r, s) = self.signature.split_at(self.signature.len() / 2);

        debug!(
            curve = %ec_key.curve(),
            signature_len = self.signature.len(),
            payload_len = self.payload.len(),
            "verifying COSE_Sign1"
        );
        ec_key.verify_raw(&tbs, r, s)
    }
}

/// Encode the Signature1 structure with an empty external AAD.
pub fn encode_sig_structure(protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, CoseError> {
    let mut out = Vec::with_capacity(32 + protected.len() + payload.len());
    Encoder::new(&mut out)
        .array(4)
        .and_then(|e| e.str(SIGNATURE1_CONTEXT))
        .and_then(|e| e.bytes(protected))
        .and_then(|e| e.bytes(&[]))
        .and_then(|e| e.bytes(payload))
        .map_err(|e| CoseError::MalformedCoseStructure(e.to_string()))?;
    Ok(out)
}

/// Decode `document` and verify its signature with `key`.
pub fn verify(document: &[u8], key: &VerifierKey) -> Result<(), CoseError> {
    CoseSign1::decode(document)?.verify(key)
}
