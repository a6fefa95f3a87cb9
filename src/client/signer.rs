use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

const ALGORITHM: &str = "SDK-HMAC-SHA256";
const DATE_HEADER: &str = "x-sdk-date";
const SECURITY_TOKEN_HEADER: &str = "x-security-token";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// AK/SK signing material; the security token rides along as its own
/// signed header when the keys are short-lived STS ones.
pub struct SigningKey<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub security_token: Option<&'a str>,
}

/// Produces the headers that authenticate one request under the
/// SDK-HMAC-SHA256 scheme: canonical request, string-to-sign, HMAC over
/// the secret key. Deterministic for a fixed timestamp.
pub fn sign_request(
    key: &SigningKey,
    method: &str,
    url: &Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date = now.format(DATE_FORMAT).to_string();
    let host = url.host_str().unwrap_or_default().to_string();

    let mut signed_headers: Vec<(String, String)> = vec![
        ("host".to_string(), host),
        (DATE_HEADER.to_string(), date.clone()),
    ];
    if let Some(token) = key.security_token {
        signed_headers.push((SECURITY_TOKEN_HEADER.to_string(), token.to_string()));
    }
    signed_headers.sort_by(|a, b| a.0.cmp(&b.0));

    let header_names: Vec<&str> = signed_headers.iter().map(|(n, _)| n.as_str()).collect();
    let signed_header_list = header_names.join(";");

    let canonical = canonical_request(method, url, &signed_headers, &signed_header_list, body);

    let string_to_sign = format!(
        "{ALGORITHM}\n{date}\n{}",
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(key.secret_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let authorization = format!(
        "{ALGORITHM} Access={}, SignedHeaders={}, Signature={}",
        key.access_key, signed_header_list, signature
    );

    let mut out: Vec<(String, String)> = signed_headers
        .into_iter()
        .filter(|(name, _)| name != "host")
        .collect();
    out.push(("authorization".to_string(), authorization));
    out
}

fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    signed_header_list: &str,
    body: &[u8],
) -> String {
    let mut canonical_uri = url.path().to_string();
    if !canonical_uri.ends_with('/') {
        canonical_uri.push('/');
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    let canonical_query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers = headers
        .iter()
        .map(|(n, v)| format!("{n}:{}\n", v.trim()))
        .collect::<String>();

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_header_list}\n{}",
        hex::encode(Sha256::digest(body))
    )
}

/// RFC 3986 encoding; everything outside the unreserved set is escaped.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
