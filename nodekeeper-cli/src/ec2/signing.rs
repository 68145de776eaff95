//! AWS Signature Version 4 for query-style GET requests

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use nodekeeper_common::{Credentials, Error, Result};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The parts of a request covered by the signature
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Host header value, including a non-default port
    pub host: &'a str,
    pub path: &'a str,
    /// Already canonical query string (see [`canonical_query`])
    pub query: &'a str,
    pub payload: &'a [u8],
}

/// Encode and sort query parameters into SigV4 canonical form
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Credentials(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the per-day, per-region, per-service signing key
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// Compute the headers that authenticate `request`
///
/// Returns `x-amz-date`, optionally `x-amz-security-token`, and `authorization`.
pub fn sign(
    request: &SigningRequest<'_>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", request.host.trim(), amz_date);
    let mut signed_headers = String::from("host;x-amz-date");
    if let Some(token) = &credentials.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token.trim()));
        signed_headers.push_str(";x-amz-security-token");
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        canonical_headers,
        signed_headers,
        sha256_hex(request.payload)
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_key, &date, region, service)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    let mut headers = vec![("x-amz-date", amz_date)];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }
    headers.push((
        "authorization",
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key, scope, signed_headers, signature
        ),
    ));

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        headers.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let query = canonical_query(&[
            ("Version", "2016-11-15"),
            ("Action", "DescribeInstances"),
            ("Filter.1.Value.1", "i-1bc624e7"),
            ("Filter.1.Name", "instance-id"),
            ("Note", "a b/c"),
        ]);

        assert_eq!(
            query,
            "Action=DescribeInstances&Filter.1.Name=instance-id&Filter.1.Value.1=i-1bc624e7\
             &Note=a%20b%2Fc&Version=2016-11-15"
        );
    }

    #[test]
    fn test_vanilla_get_matches_reference_signature() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let request = SigningRequest {
            method: "GET",
            host: "example.amazonaws.com",
            path: "/",
            query: "",
            payload: b"",
        };

        let headers = sign(&request, &example_credentials(), "us-east-1", "service", now).unwrap();

        assert_eq!(header(&headers, "x-amz-date"), Some("20150830T123600Z"));
        assert_eq!(
            header(&headers, "authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
            )
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let request = SigningRequest {
            method: "GET",
            host: "ec2.us-east-1.amazonaws.com",
            path: "/",
            query: "Action=DescribeInstances",
            payload: b"",
        };
        let credentials = example_credentials().with_session_token("session-token");

        let headers = sign(&request, &credentials, "us-east-1", "ec2", now).unwrap();

        assert_eq!(header(&headers, "x-amz-security-token"), Some("session-token"));
        let auth = header(&headers, "authorization").unwrap();
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
        assert!(auth.contains("Credential=AKIDEXAMPLE/20261019/us-east-1/ec2/aws4_request"));
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let request = SigningRequest {
            method: "GET",
            host: "ec2.us-east-1.amazonaws.com",
            path: "/",
            query: "Action=DescribeInstances",
            payload: b"",
        };

        let a = sign(&request, &Credentials::new("AKID", "one"), "us-east-1", "ec2", now).unwrap();
        let b = sign(&request, &Credentials::new("AKID", "two"), "us-east-1", "ec2", now).unwrap();
        assert_ne!(header(&a, "authorization"), header(&b, "authorization"));
    }
}
