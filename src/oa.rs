use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::PmcId;
use crate::error::StagerError;

pub const OA_SERVICE_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/oa/oa.fcgi";
pub const OA_FTP_HOST: &str = "ftp.ncbi.nlm.nih.gov";
pub const ARCHIVE_FORMAT: &str = "tgz";

pub trait OaClient: Send + Sync {
    /// Raw OA service response for one identifier. Anything other than a 200
    /// answer is an error.
    fn fetch_metadata(&self, id: &PmcId) -> Result<Vec<u8>, StagerError>;
    fn download_archive(&self, url: &str, destination: &Path) -> Result<(), StagerError>;
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            endpoint: OA_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 0,
        }
    }
}

#[derive(Clone)]
pub struct OaHttpClient {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

impl OaHttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, StagerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("guideline-stager/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| StagerError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| StagerError::Http(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            max_retries: settings.max_retries,
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
        on_error: fn(String) -> StagerError,
    ) -> Result<reqwest::blocking::Response, StagerError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(on_error(err.to_string()));
                }
            }
        }
    }
}

impl OaClient for OaHttpClient {
    fn fetch_metadata(&self, id: &PmcId) -> Result<Vec<u8>, StagerError> {
        let response = self.send_with_retries(
            || self.client.get(&self.endpoint).query(&[("id", id.as_str())]),
            StagerError::MetadataHttp,
        )?;
        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "OA metadata request failed".to_string());
            return Err(StagerError::MetadataStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| StagerError::MetadataHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn download_archive(&self, url: &str, destination: &Path) -> Result<(), StagerError> {
        let mut response =
            self.send_with_retries(|| self.client.get(url), StagerError::ArchiveHttp)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive request failed".to_string());
            return Err(StagerError::ArchiveStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| StagerError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| StagerError::ArchiveHttp(err.to_string()))?;
        Ok(())
    }
}

/// What the resolver needs out of an OA service response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaResponse {
    pub archive_href: Option<String>,
    pub error: Option<String>,
}

/// Scans the response for the first `link` whose `format` is `tgz` (any
/// case), and for an `error` element. Malformed XML ends the scan with
/// whatever was found before the fault.
pub fn parse_oa_response(xml: &str) -> OaResponse {
    let mut parsed = OaResponse::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut error_code: Option<String> = None;
    let mut in_error = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"link" if parsed.archive_href.is_none() => {
                    parsed.archive_href = archive_href(e);
                }
                b"error" => {
                    in_error = true;
                    error_code = attribute(e, b"code");
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"link" if parsed.archive_href.is_none() => {
                    parsed.archive_href = archive_href(e);
                }
                b"error" if parsed.error.is_none() => {
                    parsed.error = attribute(e, b"code");
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_error => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                parsed.error = Some(match error_code.take() {
                    Some(code) if !text.is_empty() => format!("{code}: {text}"),
                    Some(code) => code,
                    None => text,
                });
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"error" => {
                if parsed.error.is_none() {
                    parsed.error = error_code.take();
                }
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::warn!(error = %err, "malformed OA response");
                break;
            }
            _ => {}
        }
    }
    parsed
}

pub fn find_archive_link(xml: &str) -> Option<String> {
    parse_oa_response(xml).archive_href
}

fn archive_href(element: &BytesStart<'_>) -> Option<String> {
    let format = attribute(element, b"format")?;
    if !format.eq_ignore_ascii_case(ARCHIVE_FORMAT) {
        return None;
    }
    attribute(element, b"href").filter(|href| !href.is_empty())
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| {
            attr.unescape_value()
                .ok()
                .map(|value| value.trim().to_string())
        })
}

/// Rewrites legacy `ftp://` links on the OA host to `https://` on the same
/// host and path. Anything else is returned untouched.
pub fn normalize_archive_url(url: &str) -> String {
    const FTP: &str = "ftp://";
    let Some(rest) = url
        .get(..FTP.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(FTP))
        .map(|_| &url[FTP.len()..])
    else {
        return url.to_string();
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.eq_ignore_ascii_case(OA_FTP_HOST) {
        return format!("https://{rest}");
    }
    url.to_string()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
