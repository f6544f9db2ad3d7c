//! Chained-key HMAC-SHA256 request signing.
//!
//! ```text
//! canonical  = METHOD \n URI \n QUERY \n canonical-headers \n signed-headers \n hex(sha256(body))
//! to-sign    = ALGORITHM \n timestamp \n date/service/terminator \n hex(sha256(canonical))
//! key        = HMAC(HMAC(HMAC(prefix + secret, date), service), terminator)
//! signature  = hex(HMAC(key, to-sign))
//! ```
//!
//! Everything hashed is derived from the explicit [`SigningInput`]; the signer never
//! reads the clock.

use crate::{Error, Result};
use chrono::DateTime;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";

/// Provider-specific constants of the signing scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningProfile {
    pub algorithm: String,
    pub secret_prefix: String,
    pub terminator: String,
    /// Prefix of the custom headers, e.g. `X-TC` for `X-TC-Action`.
    pub header_prefix: String,
    pub service: String,
    pub version: String,
}

impl SigningProfile {
    /// Tencent Cloud TC3 profile for the Hunyuan 3D service.
    pub fn hunyuan() -> Self {
        Self {
            algorithm: "TC3-HMAC-SHA256".to_string(),
            secret_prefix: "TC3".to_string(),
            terminator: "tc3_request".to_string(),
            header_prefix: "X-TC".to_string(),
            service: "ai3d".to_string(),
            version: "2025-05-13".to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    pub host: &'a str,
    pub action: &'a str,
    pub region: Option<&'a str>,
    pub body: &'a str,
    /// Epoch seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub signature: String,
    /// Every header to send, `Authorization` first.
    pub headers: Vec<(String, String)>,
}

impl SignedHeaders {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct ProviderSigner {
    profile: SigningProfile,
    credentials: Credentials,
}

impl ProviderSigner {
    pub fn new(profile: SigningProfile, credentials: Credentials) -> Self {
        Self {
            profile,
            credentials,
        }
    }

    pub fn profile(&self) -> &SigningProfile {
        &self.profile
    }

    pub fn canonical_request(&self, input: &SigningInput<'_>) -> String {
        let canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-tc-action:{}\n",
            JSON_CONTENT_TYPE,
            input.host,
            input.action.to_lowercase()
        );
        format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers,
            SIGNED_HEADERS,
            sha256_hex(input.body.as_bytes())
        )
    }

    pub fn credential_scope(&self, date: &str) -> String {
        format!("{}/{}/{}", date, self.profile.service, self.profile.terminator)
    }

    pub fn string_to_sign(&self, timestamp: i64, date: &str, canonical_request: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.profile.algorithm,
            timestamp,
            self.credential_scope(date),
            sha256_hex(canonical_request.as_bytes())
        )
    }

    pub fn signing_key(&self, date: &str) -> Result<Vec<u8>> {
        let seed = format!("{}{}", self.profile.secret_prefix, self.credentials.secret_key);
        let k_date = hmac_sha256(seed.as_bytes(), date)?;
        let k_service = hmac_sha256(&k_date, &self.profile.service)?;
        hmac_sha256(&k_service, &self.profile.terminator)
    }

    pub fn sign(&self, input: &SigningInput<'_>) -> Result<SignedHeaders> {
        let date = utc_date(input.timestamp)?;
        let canonical = self.canonical_request(input);
        let to_sign = self.string_to_sign(input.timestamp, &date, &canonical);
        let key = self.signing_key(&date)?;
        let signature = hex::encode(hmac_sha256(&key, &to_sign)?);
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.profile.algorithm,
            self.credentials.access_id,
            self.credential_scope(&date),
            SIGNED_HEADERS,
            signature
        );

        let prefix = &self.profile.header_prefix;
        let mut headers = vec![
            ("Authorization".to_string(), authorization.clone()),
            ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
            ("Host".to_string(), input.host.to_string()),
            (format!("{}-Action", prefix), input.action.to_string()),
            (format!("{}-Timestamp", prefix), input.timestamp.to_string()),
            (format!("{}-Version", prefix), self.profile.version.clone()),
        ];
        if let Some(region) = input.region.filter(|r| !r.is_empty()) {
            headers.push((format!("{}-Region", prefix), region.to_string()));
        }

        Ok(SignedHeaders {
            authorization,
            signature,
            headers,
        })
    }
}

/// UTC calendar date (`YYYY-MM-DD`) of an epoch timestamp.
pub fn utc_date(timestamp: i64) -> Result<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .ok_or_else(|| Error::Signing(format!("timestamp {} out of range", timestamp)))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], message: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "ai3d.tencentcloudapi.com";
    const ACTION: &str = "SubmitHunyuanTo3DJob";

    fn signer() -> ProviderSigner {
        ProviderSigner::new(
            SigningProfile::hunyuan(),
            Credentials::new("AKIDEXAMPLE", "testkey"),
        )
    }

    fn input(body: &str) -> SigningInput<'_> {
        SigningInput {
            host: HOST,
            action: ACTION,
            region: Some("ap-guangzhou"),
            body,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_fixed_vector() {
        let signed = signer().sign(&input("{}")).unwrap();
        assert_eq!(
            signed.signature,
            "ed5fb0007b4d03361079f6711e3fb875508e3b1e47bb50ca3ce23c5647ce3b52"
        );
        assert_eq!(
            signed.authorization,
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2023-11-14/ai3d/tc3_request, \
             SignedHeaders=content-type;host;x-tc-action, \
             Signature=ed5fb0007b4d03361079f6711e3fb875508e3b1e47bb50ca3ce23c5647ce3b52"
        );
    }

    #[test]
    fn test_canonical_request_layout() {
        let canonical = signer().canonical_request(&input("{}"));
        assert_eq!(
            canonical,
            "POST\n/\n\n\
             content-type:application/json; charset=utf-8\n\
             host:ai3d.tencentcloudapi.com\n\
             x-tc-action:submithunyuanto3djob\n\n\
             content-type;host;x-tc-action\n\
             44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert_eq!(
            sha256_hex(canonical.as_bytes()),
            "ee8bee98008c26fa32da7a48a45dc0007b3a0dc610cf1dfdc46d008a02daedfc"
        );
    }

    #[test]
    fn test_signature_depends_on_body_and_time() {
        let s = signer();
        let base = s.sign(&input("{}")).unwrap().signature;
        assert_eq!(base, s.sign(&input("{}")).unwrap().signature);
        assert_ne!(base, s.sign(&input("{\"Prompt\":\"A cube\"}")).unwrap().signature);
        let mut later = input("{}");
        later.timestamp += 1;
        assert_ne!(base, s.sign(&later).unwrap().signature);
    }

    #[test]
    fn test_headers_follow_profile_prefix() {
        let signed = signer().sign(&input("{}")).unwrap();
        assert_eq!(signed.headers[0].0, "Authorization");
        assert_eq!(signed.get("x-tc-action"), Some(ACTION));
        assert_eq!(signed.get("X-TC-Timestamp"), Some("1700000000"));
        assert_eq!(signed.get("X-TC-Version"), Some("2025-05-13"));
        assert_eq!(signed.get("X-TC-Region"), Some("ap-guangzhou"));

        let mut no_region = input("{}");
        no_region.region = None;
        assert!(signer().sign(&no_region).unwrap().get("X-TC-Region").is_none());
    }

    #[test]
    fn test_utc_date_boundaries() {
        assert_eq!(utc_date(0).unwrap(), "1970-01-01");
        // 23:59:59 and 00:00:00 UTC fall on different dates regardless of local zone.
        assert_eq!(utc_date(1_700_006_399).unwrap(), "2023-11-14");
        assert_eq!(utc_date(1_700_006_400).unwrap(), "2023-11-15");
        assert!(utc_date(i64::MAX).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", Credentials::new("id", "very-secret"));
        assert!(!debug.contains("very-secret"));
    }
}
