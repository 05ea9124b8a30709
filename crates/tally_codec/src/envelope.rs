//! The transport envelope.
//!
//! Every payload crossing the process boundary is wrapped as
//! `{"encrypted": bool, "data": ...}`. A plain envelope embeds the
//! document JSON as-is; a sealed one carries the base64 of the sealed
//! bytes. Import requests may also carry a `passphrase` field, which is
//! never written back out.

use crate::error::{CodecError, CodecResult};
use crate::legacy::LegacyShim;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use zeroize::Zeroizing;

/// A payload with its encryption flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Document bytes in the clear.
    Plain(Vec<u8>),
    /// Output of the sealing layer.
    Sealed(Vec<u8>),
}

impl Envelope {
    /// Returns whether the payload is sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Envelope::Sealed(_))
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Envelope::Plain(bytes) | Envelope::Sealed(bytes) => bytes,
        }
    }

    /// Serializes the envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if a plain payload is not valid JSON.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.payload().len() + 32);
        match self {
            Envelope::Plain(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| CodecError::encoding_failed(format!("payload is not UTF-8: {e}")))?;
                let raw = RawValue::from_string(text.to_string())
                    .map_err(|e| CodecError::encoding_failed(format!("payload is not JSON: {e}")))?;
                out.extend_from_slice(b"{\"encrypted\":false,\"data\":");
                out.extend_from_slice(raw.get().as_bytes());
            }
            Envelope::Sealed(bytes) => {
                out.extend_from_slice(b"{\"encrypted\":true,\"data\":\"");
                out.extend_from_slice(STANDARD.encode(bytes).as_bytes());
                out.push(b'"');
            }
        }
        out.push(b'}');
        Ok(out)
    }
}

/// A parsed import request.
#[derive(Debug)]
pub struct ParsedEnvelope {
    /// The payload.
    pub envelope: Envelope,
    /// Passphrase supplied with the request, if any.
    pub passphrase: Option<Zeroizing<String>>,
    /// Shims applied to the envelope itself.
    pub shims: Vec<LegacyShim>,
}

#[derive(Deserialize)]
struct WireEnvelope<'a> {
    #[serde(default)]
    encrypted: bool,
    #[serde(borrow)]
    data: &'a RawValue,
    #[serde(default)]
    passphrase: Option<String>,
}

/// Parses an import request.
///
/// Inputs without a `data` field are treated as a bare plain document
/// (the layout of exports predating the envelope).
///
/// # Errors
///
/// - `TooLarge` if the input exceeds `max_size`
/// - `Malformed` if the input is not JSON, or a sealed payload is not a
///   base64 string
pub fn parse_request(bytes: &[u8], max_size: usize) -> CodecResult<ParsedEnvelope> {
    if bytes.len() > max_size {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            limit: max_size,
        });
    }

    let probe: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;
    let has_data = probe
        .as_object()
        .is_some_and(|root| root.contains_key("data"));
    if !has_data {
        return Ok(ParsedEnvelope {
            envelope: Envelope::Plain(bytes.to_vec()),
            passphrase: None,
            shims: vec![LegacyShim::MissingDataWrapper],
        });
    }
    let wire: WireEnvelope<'_> = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(format!("invalid envelope: {e}")))?;
    let passphrase = wire.passphrase.map(Zeroizing::new);

    let envelope = if wire.encrypted {
        let encoded: String = serde_json::from_str(wire.data.get())
            .map_err(|_| CodecError::malformed("sealed data must be a base64 string"))?;
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::malformed(format!("sealed data is not base64: {e}")))?;
        Envelope::Sealed(sealed)
    } else {
        // Some clients send the document as a JSON string.
        match serde_json::from_str::<String>(wire.data.get()) {
            Ok(text) => Envelope::Plain(text.into_bytes()),
            Err(_) => Envelope::Plain(wire.data.get().as_bytes().to_vec()),
        }
    };

    Ok(ParsedEnvelope {
        envelope,
        passphrase,
        shims: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1 << 20;

    #[test]
    fn plain_envelope_embeds_document() {
        let bytes = Envelope::Plain(b"{\"formatVersion\":2}".to_vec())
            .to_bytes()
            .unwrap();
        assert_eq!(
            bytes,
            b"{\"encrypted\":false,\"data\":{\"formatVersion\":2}}".to_vec()
        );

        let parsed = parse_request(&bytes, LIMIT).unwrap();
        assert_eq!(
            parsed.envelope,
            Envelope::Plain(b"{\"formatVersion\":2}".to_vec())
        );
        assert!(parsed.shims.is_empty());
    }

    #[test]
    fn sealed_envelope_is_base64() {
        let sealed = Envelope::Sealed(vec![0, 1, 2, 250, 251, 252]);
        let bytes = sealed.to_bytes().unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["encrypted"], true);
        assert!(json["data"].is_string());

        let parsed = parse_request(&bytes, LIMIT).unwrap();
        assert_eq!(parsed.envelope, sealed);
        assert!(parsed.envelope.is_encrypted());
    }

    #[test]
    fn plain_payload_must_be_json() {
        assert!(Envelope::Plain(b"not json".to_vec()).to_bytes().is_err());
    }

    #[test]
    fn bare_document_is_accepted() {
        let parsed = parse_request(b"{\"categories\":[]}", LIMIT).unwrap();
        assert_eq!(
            parsed.envelope,
            Envelope::Plain(b"{\"categories\":[]}".to_vec())
        );
        assert_eq!(parsed.shims, vec![LegacyShim::MissingDataWrapper]);
    }

    #[test]
    fn passphrase_is_extracted() {
        let parsed = parse_request(
            b"{\"encrypted\":true,\"data\":\"AAEC\",\"passphrase\":\"hunter2\"}",
            LIMIT,
        )
        .unwrap();
        assert_eq!(parsed.passphrase.as_deref().map(String::as_str), Some("hunter2"));
        assert_eq!(parsed.envelope, Envelope::Sealed(vec![0, 1, 2]));
    }

    #[test]
    fn stringified_plain_document_is_unwrapped() {
        let parsed =
            parse_request(b"{\"encrypted\":false,\"data\":\"{\\\"a\\\":1}\"}", LIMIT).unwrap();
        assert_eq!(parsed.envelope, Envelope::Plain(b"{\"a\":1}".to_vec()));
    }

    #[test]
    fn sealed_data_must_be_a_string() {
        let err = parse_request(b"{\"encrypted\":true,\"data\":{}}", LIMIT).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));

        let err = parse_request(b"{\"encrypted\":true,\"data\":\"@@@\"}", LIMIT).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let err = parse_request(b"{\"data\":{}}", 4).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge { size: 11, limit: 4 }));
    }
}
