//! Cursor-paged ingestion.
//!
//! The feed answers `GET <url>?cursor=<cursor>` with a [`Page`]. The first
//! request sends an empty cursor; each following request sends the cursor of
//! the page before it. `hasMore == false` is the only stop signal, so a page
//! with zero nodes but `hasMore == true` is followed like any other.
//!
//! [`Pages`] turns any [`PageSource`] into an iterator. It never fetches
//! ahead: the next request happens only when the caller asks for the next
//! page, which keeps page processing strictly sequential.

use crate::types::Page;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {status} for cursor {cursor:?}")]
    Status { status: u16, cursor: String },
    #[error("feed page is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can produce the page following `cursor`.
pub trait PageSource {
    fn fetch(&mut self, cursor: &str) -> Result<Page, FetchError>;
}

impl<S: PageSource + ?Sized> PageSource for &mut S {
    fn fetch(&mut self, cursor: &str) -> Result<Page, FetchError> {
        (**self).fetch(cursor)
    }
}

/// Feed served over HTTP.
pub struct HttpFeed {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl PageSource for HttpFeed {
    fn fetch(&mut self, cursor: &str) -> Result<Page, FetchError> {
        tracing::debug!(url = %self.url, cursor, "fetching page");
        let response = self
            .client
            .get(&self.url)
            .query(&[("cursor", cursor)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                cursor: cursor.to_string(),
            });
        }

        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Iterator over the pages of a feed.
///
/// Yields each page once, stops after the first page with
/// `hasMore == false`, and stops after yielding the first error.
pub struct Pages<S> {
    source: S,
    cursor: String,
    done: bool,
}

impl<S: PageSource> Pages<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cursor: String::new(),
            done: false,
        }
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: PageSource> Iterator for Pages<S> {
    type Item = Result<Page, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.fetch(&self.cursor) {
            Ok(page) => {
                self.done = !page.has_more;
                self.cursor = page.cursor.clone();
                Some(Ok(page))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
