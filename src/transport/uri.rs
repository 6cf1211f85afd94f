//! Target URI parsing and resolution.

use std::fmt;
use std::net::SocketAddr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use url::Url;

use crate::transport::DEFAULT_PORT;

/// Characters escaped when a path segment is printed back.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?');

/// Characters escaped when a query item is printed back.
const QUERY_ITEM: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'&');

#[derive(Debug, Error)]
pub enum UriError {
    #[error("malformed URI: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("unsupported scheme '{0}' (only coap is supported)")]
    UnsupportedScheme(String),

    #[error("URI has no host")]
    MissingHost,

    #[error("'{0}' does not decode to UTF-8")]
    BadEscape(String),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} resolved to no addresses")]
    NoAddress(String),
}

/// A parsed `coap://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapUri {
    host: String,
    port: u16,
    path: Vec<String>,
    query: Vec<String>,
}

impl CoapUri {
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let url = Url::parse(input)?;
        if url.scheme() != "coap" {
            return Err(UriError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']'),
            _ => return Err(UriError::MissingHost),
        };

        // Option values go on the wire unescaped.
        let path = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(decode)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        // Split before decoding so an escaped '&' stays inside its item.
        let query = url
            .query()
            .map(|q| {
                q.split('&')
                    .filter(|s| !s.is_empty())
                    .map(decode)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
            query,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn query(&self) -> &[String] {
        &self.query
    }

    /// Resolve the host to a socket address; the first result wins.
    pub async fn resolve(&self) -> Result<SocketAddr, UriError> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| UriError::Resolve {
                host: self.host.clone(),
                source,
            })?;
        addrs.next().ok_or_else(|| UriError::NoAddress(self.host.clone()))
    }
}

impl fmt::Display for CoapUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "coap://[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "coap://{}:{}", self.host, self.port)?;
        }
        for segment in &self.path {
            write!(f, "/{}", utf8_percent_encode(segment, SEGMENT))?;
        }
        for (i, item) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}", sep, utf8_percent_encode(item, QUERY_ITEM))?;
        }
        Ok(())
    }
}

fn decode(raw: &str) -> Result<String, UriError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| UriError::BadEscape(raw.to_string()))
}
