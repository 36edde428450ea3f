//! AWS Nitro Enclaves attestation payload.
//!
//! The COSE payload is a CBOR map:
//!
//! ```text
//! { module_id: tstr, digest: tstr, timestamp: uint,
//!   pcrs: { uint => bstr }, certificate: bstr, cabundle: [* bstr],
//!   ? public_key: bstr / nil, ? user_data: bstr / nil, ? nonce: bstr / nil }
//! ```

use minicbor::data::Type;
use minicbor::Decoder;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::cose::CoseSign1;
use super::key::VerifierKey;
use super::root::{certificate_key, NitroRoot};
use super::CoseError;

/// Decoded attestation document payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NitroAttestation {
    pub module_id: String,
    /// Digest algorithm of the PCRs, e.g. `SHA384`.
    pub digest: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub pcrs: BTreeMap<u64, Vec<u8>>,
    /// DER leaf certificate whose key signed the envelope.
    pub certificate: Vec<u8>,
    /// DER chain from the root towards the leaf, root first.
    pub cabundle: Vec<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    pub user_data: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
}

type DecodeResult<T> = Result<T, CoseError>;

fn malformed(e: impl ToString) -> CoseError {
    CoseError::MalformedPayload(e.to_string())
}

impl NitroAttestation {
    /// Decode the CBOR payload of a COSE_Sign1 document.
    pub fn from_payload(payload: &[u8]) -> DecodeResult<Self> {
        let mut dec = Decoder::new(payload);
        let entries = dec
            .map()
            .map_err(malformed)?
            .ok_or_else(|| malformed("indefinite-length map"))?;

        let mut doc = NitroAttestation::default();
        let mut seen_certificate = false;
        for _ in 0..entries {
            let key = dec.str().map_err(malformed)?;
            match key {
                "module_id" => doc.module_id = dec.str().map_err(malformed)?.to_string(),
                "digest" => doc.digest = dec.str().map_err(malformed)?.to_string(),
                "timestamp" => doc.timestamp = dec.u64().map_err(malformed)?,
                "pcrs" => doc.pcrs = decode_pcrs(&mut dec)?,
                "certificate" => {
                    doc.certificate = dec.bytes().map_err(malformed)?.to_vec();
                    seen_certificate = true;
                }
                "cabundle" => doc.cabundle = decode_cabundle(&mut dec)?,
                "public_key" => doc.public_key = optional_bytes(&mut dec)?,
                "user_data" => doc.user_data = optional_bytes(&mut dec)?,
                "nonce" => doc.nonce = optional_bytes(&mut dec)?,
                _ => dec.skip().map_err(malformed)?,
            }
        }

        if dec.position() != payload.len() {
            return Err(malformed("trailing bytes after payload"));
        }
        if !seen_certificate {
            return Err(malformed("missing certificate"));
        }
        Ok(doc)
    }

    /// Decode the envelope and its payload without checking any signature.
    pub fn decode(document: &[u8]) -> DecodeResult<Self> {
        Self::from_payload(CoseSign1::decode(document)?.payload)
    }

    /// Public key of the leaf certificate.
    pub fn leaf_key(&self) -> DecodeResult<VerifierKey> {
        certificate_key(&self.certificate)
    }

    pub fn pcr(&self, index: u64) -> Option<&[u8]> {
        self.pcrs.get(&index).map(Vec::as_slice)
    }

    /// Walk `root -> cabundle[1..] -> certificate`.
    ///
    /// The first bundle entry must be byte-identical to `root`. Validity
    /// periods and extensions are not inspected.
    pub fn verify_chain(&self, root: &NitroRoot) -> DecodeResult<()> {
        let first = self
            .cabundle
            .first()
            .ok_or_else(|| CoseError::InvalidCertificate("empty cabundle".into()))?;
        if first.as_slice() != root.der() {
            return Err(CoseError::InvalidCertificate(
                "cabundle does not start at the trusted root".into(),
            ));
        }

        let mut issuer = root.verifier_key().clone();
        for cert in self.cabundle.iter().skip(1).chain(std::iter::once(&self.certificate)) {
            super::root::verify_certificate_signature(cert, &issuer)?;
            issuer = certificate_key(cert)?;
        }
        debug!(depth = self.cabundle.len(), "certificate chain verified");
        Ok(())
    }
}

fn decode_pcrs(dec: &mut Decoder<'_>) -> DecodeResult<BTreeMap<u64, Vec<u8>>> {
    let len = dec
        .map()
        .map_err(malformed)?
        .ok_or_else(|| malformed("indefinite-length pcrs"))?;
    let mut pcrs = BTreeMap::new();
    for _ in 0..len {
        let index = dec.u64().map_err(malformed)?;
        let value = dec.bytes().map_err(malformed)?.to_vec();
        pcrs.insert(index, value);
    }
    Ok(pcrs)
}

fn decode_cabundle(dec: &mut Decoder<'_>) -> DecodeResult<Vec<Vec<u8>>> {
    let len = dec
        .array()
        .map_err(malformed)?
        .ok_or_else(|| malformed("indefinite-length cabundle"))?;
    (0..len)
        .map(|_| dec.bytes().map(<[u8]>::to_vec).map_err(malformed))
        .collect()
}

fn optional_bytes(dec: &mut Decoder<'_>) -> DecodeResult<Option<Vec<u8>>> {
    match dec.datatype().map_err(malformed)? {
        Type::Null => {
            dec.null().map_err(malformed)?;
            Ok(None)
        }
        _ => Ok(Some(dec.bytes().map_err(malformed)?.to_vec())),
    }
}

/// Verify a Nitro document against the key in its own leaf certificate.
///
/// Returns the decoded payload on success. This proves the envelope was
/// signed by the certificate holder; pair it with
/// [`NitroAttestation::verify_chain`] to anchor the leaf.
pub fn verify_embedded(document: &[u8]) -> DecodeResult<NitroAttestation> {
    let envelope = CoseSign1::decode(document)?;
    let attestation = NitroAttestation::from_payload(envelope.payload)?;
    envelope.verify(&attestation.leaf_key()?)?;
    info!(
        module_id = %attestation.module_id,
        timestamp = attestation.timestamp,
        "attestation document signature verified"
    );
    Ok(attestation)
}

/// Verify signature and chain against `root`.
pub fn verify_with_root(document: &[u8], root: &NitroRoot) -> DecodeResult<NitroAttestation> {
    let attestation = verify_embedded(document)?;
    attestation.verify_chain(root)?;
    Ok(attestation)
}
