//! AWS Signature Version 4 request signing
//!
//! Bedrock authenticates with SigV4 over an access key / secret key pair and
//! an optional session token. Only the header-based variant is implemented,
//! with `content-type`, `host`, `x-amz-date` (and `x-amz-security-token` when
//! a token is present) as the signed header set.

use crate::adk::error::AdkError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::env;

type HmacSha256 = Hmac<Sha256>;

/// Already-resolved AWS credentials
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Read credentials from the conventional environment variables.
    ///
    /// Credential *acquisition* (profiles, SSO, IMDS) is someone else's job;
    /// by the time this adapter runs, the variables are expected to be set.
    pub fn from_env() -> Result<Self, AdkError> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| AdkError::config("AWS_ACCESS_KEY_ID must be set"))?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| AdkError::config("AWS_SECRET_ACCESS_KEY must be set"))?;
        let session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Headers to attach to the outgoing request
#[derive(Debug)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

/// `YYYYMMDD'T'HHMMSS'Z'` timestamp as SigV4 wants it
pub fn amz_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Sign one request. `canonical_uri` must already be in canonical (encoded)
/// form and `canonical_query` must hold sorted, encoded `k=v` pairs.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    method: &str,
    host: &str,
    canonical_uri: &str,
    canonical_query: &str,
    content_type: &str,
    payload: &[u8],
    amz_date: &str,
) -> SignedHeaders {
    let date = &amz_date[..8];
    let scope = format!("{}/{}/{}/aws4_request", date, region, service);

    let mut canonical_headers = format!(
        "content-type:{}\nhost:{}\nx-amz-date:{}\n",
        content_type, host, amz_date
    );
    let mut signed_header_names = "content-type;host;x-amz-date".to_string();
    if let Some(token) = &credentials.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
        signed_header_names.push_str(";x-amz-security-token");
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri,
        canonical_query,
        canonical_headers,
        signed_header_names,
        hex_sha256(payload)
    );

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let secret = format!("AWS4{}", credentials.secret_access_key);
    let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");

    let mut mac = HmacSha256::new_from_slice(&k_signing).expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    let signature = format!("{:x}", mac.finalize().into_bytes());

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, signed_header_names, signature
    );

    SignedHeaders {
        amz_date: amz_date.to_string(),
        authorization,
        security_token: credentials.session_token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        }
    }

    // The worked GET ListUsers example from the AWS SigV4 documentation.
    #[test]
    fn test_signature_matches_aws_documentation_vector() {
        let signed = sign_request(
            &example_credentials(),
            "us-east-1",
            "iam",
            "GET",
            "iam.amazonaws.com",
            "/",
            "Action=ListUsers&Version=2010-05-08",
            "application/x-www-form-urlencoded; charset=utf-8",
            b"",
            "20150830T123600Z",
        );

        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert!(signed.security_token.is_none());
    }

    #[test]
    fn test_session_token_joins_signed_headers() {
        let mut creds = example_credentials();
        creds.session_token = Some("FwoGZXIvYXdzEXAMPLE".to_string());

        let signed = sign_request(
            &creds,
            "us-east-1",
            "bedrock",
            "POST",
            "bedrock-runtime.us-east-1.amazonaws.com",
            "/model/test/invoke",
            "",
            "application/json",
            b"{}",
            "20240101T000000Z",
        );

        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
        assert_eq!(signed.security_token.as_deref(), Some("FwoGZXIvYXdzEXAMPLE"));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = amz_timestamp(
            DateTime::parse_from_rfc3339("2015-08-30T12:36:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert_eq!(ts, "20150830T123600Z");
    }
}
