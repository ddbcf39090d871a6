use std::io::Read;

use ir_schedule_common::{FetchError, SCHEDULE_CACHE_CAPACITY};

/// Bodies past this are refused while reading. The cycle still rejects any
/// document that does not fit the retained cache.
pub const MAX_DOCUMENT_LEN: usize = SCHEDULE_CACHE_CAPACITY * 4;

/// Reads at most [`MAX_DOCUMENT_LEN`] bytes, failing if the source has more.
pub fn read_capped(mut reader: impl Read) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::with_capacity(SCHEDULE_CACHE_CAPACITY);
    let limit = (MAX_DOCUMENT_LEN + 1) as u64;
    reader
        .by_ref()
        .take(limit)
        .read_to_end(&mut body)
        .map_err(|err| FetchError::Io(err.to_string()))?;

    if body.len() > MAX_DOCUMENT_LEN {
        return Err(FetchError::TooLarge {
            len: body.len(),
            capacity: MAX_DOCUMENT_LEN,
        });
    }
    Ok(body)
}

#[cfg(not(feature = "esp32"))]
pub use host::DocumentFetcher;

#[cfg(not(feature = "esp32"))]
mod host {
    use std::{fs::File, path::PathBuf, time::Duration};

    use ir_schedule_common::{FetchError, ScheduleSource};
    use tracing::debug;

    use super::read_capped;

    const HTTP_TIMEOUT_SECS: u64 = 15;

    enum Location {
        Http(String),
        File(PathBuf),
    }

    /// Schedule source for the host build: an `http(s)://` URL or a local path.
    ///
    /// The blocking HTTP client is built on first use because it cannot be
    /// created from inside the async runtime.
    pub struct DocumentFetcher {
        location: Location,
        client: Option<reqwest::blocking::Client>,
    }

    impl DocumentFetcher {
        pub fn new(source: &str) -> Self {
            let location = if source.starts_with("http://") || source.starts_with("https://") {
                Location::Http(source.to_string())
            } else {
                Location::File(PathBuf::from(source))
            };
            Self {
                location,
                client: None,
            }
        }

        fn client(&mut self) -> Result<&reqwest::blocking::Client, FetchError> {
            if self.client.is_none() {
                let client = reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                    .build()
                    .map_err(|err| FetchError::Transport(err.to_string()))?;
                self.client = Some(client);
            }
            self.client
                .as_ref()
                .ok_or_else(|| FetchError::Transport("http client unavailable".to_string()))
        }

        fn fetch_http(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
            let response = self
                .client()?
                .get(url)
                .send()
                .map_err(|err| FetchError::Transport(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            read_capped(response)
        }
    }

    impl ScheduleSource for DocumentFetcher {
        fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
            let body = match &self.location {
                Location::Http(url) => {
                    let url = url.clone();
                    self.fetch_http(&url)?
                }
                Location::File(path) => {
                    let file = File::open(path)
                        .map_err(|err| FetchError::Io(format!("{}: {err}", path.display())))?;
                    read_capped(file)?
                }
            };
            debug!("fetched schedule document, {} bytes", body.len());
            Ok(body)
        }
    }
}

#[cfg(feature = "esp32")]
pub use esp::EspDocumentFetcher;

#[cfg(feature = "esp32")]
mod esp {
    use std::time::Duration;

    use embedded_svc::{
        http::{client::Client as HttpClient, Method, Status},
        io::Read,
    };
    use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
    use ir_schedule_common::{FetchError, ScheduleSource, SCHEDULE_CACHE_CAPACITY};
    use log::debug;

    use super::MAX_DOCUMENT_LEN;

    const HTTP_TIMEOUT_SECS: u64 = 15;
    const READ_CHUNK: usize = 256;

    /// HTTPS schedule source using the bundled certificate store.
    pub struct EspDocumentFetcher {
        url: String,
    }

    impl EspDocumentFetcher {
        pub fn new(url: String) -> Self {
            Self { url }
        }
    }

    impl ScheduleSource for EspDocumentFetcher {
        fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
            let transport = |err: &dyn std::fmt::Debug| FetchError::Transport(format!("{err:?}"));

            let http_conf = HttpClientConfiguration {
                timeout: Some(Duration::from_secs(HTTP_TIMEOUT_SECS)),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let connection = EspHttpConnection::new(&http_conf).map_err(|e| transport(&e))?;
            let mut client = HttpClient::wrap(connection);
            let request = client
                .request(Method::Get, &self.url, &[])
                .map_err(|e| transport(&e))?;
            let mut response = request.submit().map_err(|e| transport(&e))?;

            let status = response.status();
            if !(200..300).contains(&status) {
                return Err(FetchError::Status(status));
            }

            let mut body = Vec::with_capacity(SCHEDULE_CACHE_CAPACITY);
            let mut chunk = [0_u8; READ_CHUNK];
            loop {
                let read = response.read(&mut chunk).map_err(|e| transport(&e))?;
                if read == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..read]);
                if body.len() > MAX_DOCUMENT_LEN {
                    return Err(FetchError::TooLarge {
                        len: body.len(),
                        capacity: MAX_DOCUMENT_LEN,
                    });
                }
            }

            debug!("fetched {} ({} bytes)", self.url, body.len());
            Ok(body)
        }
    }
}
