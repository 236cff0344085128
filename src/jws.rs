//! JWS framing for signed requests.
//!
//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use p256::{
    ecdsa::{signature::Signer as _, Signature},
    elliptic_curve::sec1::ToEncodedPoint as _,
};
use serde::{Deserialize, Serialize};

use crate::{acct::AcmeKey, error::AcmeError};

/// Protected header values assembled per request before signing.
///
/// The nonce is present on every signed POST. The target URL is carried
/// only under RFC 8555; the legacy draft protected header has no `url`
/// member.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProtectedHeaders {
    pub nonce: Option<String>,
    pub url: Option<String>,
}

/// JWS Protected Header as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by
/// > a certificate key, there MUST be a "jwk" field. For all other
/// > requests, the request is signed using an existing account, and there
/// > MUST be a "kid" field.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtectedHeader {
    alg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    /// Embedded public key. Mutually exclusive with `kid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Account URL as key identifier. Mutually exclusive with `jwk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct Jwk {
    alg: String,
    crv: String,
    kty: String,
    #[serde(rename = "use")]
    _use: String,
    x: String,
    y: String,
}

impl TryFrom<&AcmeKey> for Jwk {
    type Error = AcmeError;

    fn try_from(key: &AcmeKey) -> Result<Self, AcmeError> {
        let point = key.signing_key().verifying_key().to_encoded_point(false);

        let x = point
            .x()
            .ok_or_else(|| AcmeError::Key("EC point has no x coordinate".to_owned()))?;
        let y = point
            .y()
            .ok_or_else(|| AcmeError::Key("EC point has no y coordinate".to_owned()))?;

        Ok(Jwk {
            alg: "ES256".to_owned(),
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            _use: "sig".to_owned(),
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        })
    }
}

/// Flattened JSON JWS serialization.
///
/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Sign `payload` into a flattened JWS object.
///
/// `key_id` selects the key representation: `Some(url)` produces kid-form,
/// `None` embeds the public key as `jwk`. The result is the JSON object
/// sent as the body of a signed POST.
pub(crate) fn sign(
    payload: &serde_json::Value,
    prot: &ProtectedHeaders,
    key: &AcmeKey,
    key_id: Option<&str>,
) -> Result<serde_json::Value, AcmeError> {
    let header = JwsProtectedHeader {
        alg: "ES256".to_owned(),
        nonce: prot.nonce.clone(),
        url: prot.url.clone(),
        jwk: match key_id {
            None => Some(Jwk::try_from(key)?),
            Some(_) => None,
        },
        kid: key_id.map(str::to_owned),
    };

    let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(&header)?);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(payload)?);

    let to_sign = format!("{protected}.{payload}");
    let signature: Signature = key.signing_key().sign(to_sign.as_bytes());
    let signature = BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(serde_json::to_value(FlattenedJsonJws {
        protected,
        payload,
        signature,
    })?)
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::signature::Verifier as _;

    use super::*;

    fn prot(nonce: &str, url: Option<&str>) -> ProtectedHeaders {
        ProtectedHeaders {
            nonce: Some(nonce.to_owned()),
            url: url.map(str::to_owned),
        }
    }

    fn decode_protected(jws: &serde_json::Value) -> serde_json::Value {
        let protected = jws["protected"].as_str().unwrap();
        let raw = BASE64_URL_SAFE_NO_PAD.decode(protected).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn jwk_form_embeds_public_key() {
        let key = AcmeKey::generate();
        let payload = serde_json::json!({ "termsOfServiceAgreed": true });

        let jws = sign(
            &payload,
            &prot("nonce-1", Some("https://ca.test/acme/new-acct")),
            &key,
            None,
        )
        .unwrap();

        let header = decode_protected(&jws);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["nonce"], "nonce-1");
        assert_eq!(header["url"], "https://ca.test/acme/new-acct");
        assert_eq!(header["jwk"]["kty"], "EC");
        assert_eq!(header["jwk"]["crv"], "P-256");
        assert!(header.get("kid").is_none());
    }

    #[test]
    fn kid_form_carries_account_url() {
        let key = AcmeKey::generate();
        let payload = serde_json::json!({});

        let jws = sign(
            &payload,
            &prot("nonce-2", Some("https://ca.test/acme/order")),
            &key,
            Some("https://ca.test/acme/acct/17"),
        )
        .unwrap();

        let header = decode_protected(&jws);
        assert_eq!(header["kid"], "https://ca.test/acme/acct/17");
        assert!(header.get("jwk").is_none());
    }

    #[test]
    fn draft_form_has_no_url_member() {
        let key = AcmeKey::generate();
        let payload = serde_json::json!({ "resource": "new-reg" });

        let jws = sign(&payload, &prot("nonce-3", None), &key, None).unwrap();

        let header = decode_protected(&jws);
        assert_eq!(header["nonce"], "nonce-3");
        assert!(header.get("url").is_none());
    }

    #[test]
    fn signature_verifies_with_account_key() {
        let key = AcmeKey::generate();
        let payload = serde_json::json!({ "status": "deactivated" });

        let jws = sign(
            &payload,
            &prot("nonce-4", Some("https://ca.test/acme/acct/17")),
            &key,
            Some("https://ca.test/acme/acct/17"),
        )
        .unwrap();

        let signed = format!(
            "{}.{}",
            jws["protected"].as_str().unwrap(),
            jws["payload"].as_str().unwrap()
        );
        let raw_sig = BASE64_URL_SAFE_NO_PAD
            .decode(jws["signature"].as_str().unwrap())
            .unwrap();
        let signature = Signature::from_slice(&raw_sig).unwrap();

        key.signing_key()
            .verifying_key()
            .verify(signed.as_bytes(), &signature)
            .unwrap();
    }
}
