//! Azure Blob Storage REST client
//!
//! Uses the List Blobs and Get Blob operations. Authentication is either an
//! appended SAS token or anonymous access on a public container.

use crate::error::{BlobStoreError, Result};
use crate::store::{BlobStore, ListPage, ListRequest};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2021-08-06";

/// Azure limits `maxresults` to 5000 per request
const MAX_RESULTS_CAP: usize = 5000;

/// Client for a single container
pub struct AzureBlobStore {
    client: reqwest::Client,
    endpoint: String,
    container: String,
    sas_token: Option<String>,
}

impl AzureBlobStore {
    /// Store for `https://{account}.blob.core.windows.net/{container}`
    pub fn new(account: &str, container: &str) -> Self {
        Self::with_endpoint(
            format!("https://{}.blob.core.windows.net", account),
            container,
        )
    }

    /// Store with an explicit service endpoint (Azurite, sovereign clouds)
    pub fn with_endpoint(endpoint: impl Into<String>, container: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            container: container.trim_matches('/').to_string(),
            sas_token: None,
        }
    }

    /// Append a SAS token (with or without the leading `?`) to every request
    pub fn with_sas_token(mut self, token: Option<String>) -> Self {
        self.sas_token = token
            .map(|t| t.trim_start_matches('?').to_string())
            .filter(|t| !t.is_empty());
        self
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.container)
    }

    fn blob_url(&self, name: &str) -> String {
        let encoded: Vec<String> = name
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.container_url(), encoded.join("/"))
    }

    fn with_sas(&self, mut url: String) -> String {
        if let Some(sas) = &self.sas_token {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(sas);
        }
        url
    }

    fn list_url(&self, request: &ListRequest, marker: Option<&str>) -> String {
        let mut url = format!(
            "{}?restype=container&comp=list&maxresults={}",
            self.container_url(),
            request.page_size.clamp(1, MAX_RESULTS_CAP)
        );
        if !request.prefix.is_empty() {
            url.push_str(&format!("&prefix={}", urlencoding::encode(&request.prefix)));
        }
        if let Some(marker) = marker {
            url.push_str(&format!("&marker={}", urlencoding::encode(marker)));
        }
        self.with_sas(url)
    }

    async fn fetch_raw_page(&self, request: &ListRequest, marker: Option<&str>) -> Result<RawPage> {
        let url = self.list_url(request, marker);
        debug!(prefix = %request.prefix, marker = ?marker, "Listing blobs");

        let response = self
            .client
            .get(&url)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), container = %self.container, "Blob listing failed");
            return Err(BlobStoreError::Status {
                status: response.status().as_u16(),
                url: self.container_url(),
            });
        }

        let body = response.text().await?;
        parse_list_response(&body)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        // One List Blobs request per call. The REST API cannot filter on
        // suffix, so a page may come back empty with a next token.
        let raw = self
            .fetch_raw_page(request, request.continuation_token.as_deref())
            .await?;
        let names = raw
            .names
            .into_iter()
            .filter(|name| request.matches_suffix(name))
            .collect();

        Ok(ListPage {
            names,
            next_token: raw.next_marker,
        })
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let url = self.with_sas(self.blob_url(name));
        debug!(blob = %name, "Downloading blob");

        let response = self
            .client
            .get(&url)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobStoreError::NotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(BlobStoreError::Status {
                status: response.status().as_u16(),
                url: self.blob_url(name),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.container_url(), name)
    }
}

/// Unfiltered names plus the `NextMarker` of one List Blobs response
#[derive(Debug, Default, PartialEq, Eq)]
struct RawPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    BlobName,
    NextMarker,
}

fn parse_list_response(xml: &str) -> Result<RawPage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = RawPage::default();
    let mut in_blob = false;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"Blob" => in_blob = true,
                b"Name" if in_blob => field = Some(Field::BlobName),
                b"NextMarker" => field = Some(Field::NextMarker),
                _ => field = None,
            },
            Event::End(e) => {
                if e.name().as_ref() == b"Blob" {
                    in_blob = false;
                }
                field = None;
            }
            Event::Text(text) => {
                let value = text.unescape()?.into_owned();
                match field {
                    Some(Field::BlobName) => page.names.push(value),
                    Some(Field::NextMarker) if !value.is_empty() => page.next_marker = Some(value),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(page)
}
