use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::Sha256;

use crate::{Error, Result};

const STORAGE_API_VERSION: &str = "2017-11-09";

type HmacSha256 = Hmac<Sha256>;

/// Client for the Azure Blob Storage REST API of a single storage account.
///
/// Requests are authorized with the account's Shared Key.
#[derive(Clone)]
pub struct StorageClient {
    account: String,
    key: Vec<u8>,
    base_url: String,
    http: reqwest::Client,
}

impl StorageClient {
    /// `access_key` is the base64 key shown in the portal / `listKeys`.
    pub fn new(account: impl Into<String>, access_key: &str) -> Result<Self> {
        let account = account.into();
        let key = STANDARD
            .decode(access_key.trim())
            .map_err(|e| Error::InvalidKey(e.to_string()))?;

        Ok(Self {
            base_url: format!("https://{account}.blob.core.windows.net"),
            account,
            key,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Canonical string-to-sign for a body-less request.
    ///
    /// The eleven standard headers between the verb and the `x-ms-*` headers
    /// are all empty for the requests this client issues.
    fn string_to_sign(&self, verb: &str, date: &str, path: &str, query: &[(&str, &str)]) -> String {
        let mut params: Vec<(String, &str)> = query
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect();
        params.sort();

        let mut resource = format!("/{}/{path}", self.account);
        for (k, v) in params {
            resource.push_str(&format!("\n{k}:{v}"));
        }

        format!(
            "{verb}\n{}x-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}\n{resource}",
            "\n".repeat(11)
        )
    }

    fn sign(&self, string_to_sign: &str) -> Result<String> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|e| Error::InvalidKey(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn send(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let signature = self.sign(&self.string_to_sign(method.as_str(), &date, path, query))?;

        let resp = self
            .http
            .request(method, format!("{}/{path}", self.base_url))
            .query(query)
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(
                "Authorization",
                format!("SharedKey {}:{signature}", self.account),
            )
            .send()
            .await?;

        Ok(resp)
    }

    async fn fail(resp: reqwest::Response, endpoint: &'static str) -> Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Error::Api { endpoint, status, body }
    }

    // ── Blobs ────────────────────────────────────────────────────────

    pub async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool> {
        let resp = self
            .send(Method::HEAD, &format!("{container}/{blob}"), &[])
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::fail(resp, "get blob properties").await),
        }
    }

    /// Delete a blob. A missing blob counts as deleted.
    pub async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        let resp = self
            .send(Method::DELETE, &format!("{container}/{blob}"), &[])
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::fail(resp, "delete blob").await),
        }
    }

    /// Names of all blobs in `container` starting with `prefix`.
    pub async fn list_blobs(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker = String::new();

        loop {
            let mut query = vec![("comp", "list"), ("prefix", prefix), ("restype", "container")];
            if !marker.is_empty() {
                query.push(("marker", marker.as_str()));
            }

            let resp = self.send(Method::GET, container, &query).await?;
            if !resp.status().is_success() {
                return Err(Self::fail(resp, "list blobs").await);
            }
            let body = resp.text().await?;

            names.extend(tag_values(&body, "Name"));

            match tag_values(&body, "NextMarker").pop() {
                Some(next) if !next.is_empty() => marker = next,
                _ => break,
            }
        }

        Ok(names)
    }
}

/// Decoded text content of every `<tag>...</tag>` element in an XML listing.
fn tag_values(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        values.push(unescape(&after[..end]));
        rest = &after[end + close.len()..];
    }
    values
}

/// Resolve the predefined XML entities and numeric character references.
///
/// Unknown or malformed references are kept verbatim.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').and_then(|semi| {
            let c = match &rest[1..semi] {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                entity => {
                    let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                        None => entity.strip_prefix('#')?.parse::<u32>().ok()?,
                    };
                    char::from_u32(code)?
                }
            };
            Some((c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
