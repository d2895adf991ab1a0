//! Mirror endpoints and the ordered mirror set.

use reqwest::Url;

use crate::error::{MirrorError, MirrorResult};

/// Parse an http(s) base URI that has a host.
pub fn parse_base_uri(uri: &str) -> Result<Url, String> {
    let url = Url::parse(uri.trim()).map_err(|e| e.to_string())?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }

    Ok(url)
}

/// One source of metadata: the origin or a secondary mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_uri: String,
    host_key: String,
    disabled: bool,
}

impl Endpoint {
    /// Create an endpoint, validating the base URI.
    ///
    /// Returns the validation reason on failure so callers can choose the
    /// error variant.
    pub fn new(base_uri: &str) -> Result<Self, String> {
        let url = parse_base_uri(base_uri)?;
        let host = url.host_str().unwrap_or_default();
        let host_key = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self {
            base_uri: base_uri.trim().trim_end_matches('/').to_string(),
            host_key,
            disabled: false,
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// `scheme://host[:port]`, the key error counts are tracked under.
    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Absolute URL for a relative URI on this endpoint.
    pub fn url_for(&self, uri: &str) -> String {
        format!("{}/{}", self.base_uri, uri.trim_start_matches('/'))
    }
}

/// The origin plus secondary mirrors, in configured order.
#[derive(Debug, Clone)]
pub struct MirrorSet {
    origin: Endpoint,
    mirrors: Vec<Endpoint>,
}

impl MirrorSet {
    /// Build a mirror set.
    ///
    /// An invalid origin is an [`MirrorError::InvalidOrigin`]; an invalid
    /// mirror is a configuration error. Mirrors that share the origin's host
    /// or repeat an earlier mirror are dropped.
    pub fn new<S: AsRef<str>>(origin: &str, mirrors: &[S]) -> MirrorResult<Self> {
        let origin = Endpoint::new(origin).map_err(|reason| MirrorError::InvalidOrigin {
            url: origin.to_string(),
            reason,
        })?;

        let mut set = Self {
            origin,
            mirrors: Vec::with_capacity(mirrors.len()),
        };

        for mirror in mirrors {
            let mirror = mirror.as_ref();
            let endpoint = Endpoint::new(mirror).map_err(|reason| {
                MirrorError::Config(format!("invalid mirror url '{}': {}", mirror, reason))
            })?;

            let duplicate = endpoint.host_key == set.origin.host_key
                || set.mirrors.iter().any(|m| m.host_key == endpoint.host_key);
            if duplicate {
                tracing::debug!(mirror = %endpoint.base_uri, "Ignoring duplicate mirror");
                continue;
            }
            set.mirrors.push(endpoint);
        }

        Ok(set)
    }

    pub fn origin(&self) -> &Endpoint {
        &self.origin
    }

    /// All secondary mirrors, disabled ones included.
    pub fn mirrors(&self) -> &[Endpoint] {
        &self.mirrors
    }

    /// Secondary mirrors that have not been disabled.
    pub fn active(&self) -> impl Iterator<Item = &Endpoint> {
        self.mirrors.iter().filter(|m| !m.disabled)
    }

    /// Disable the mirror with the given host key.
    ///
    /// Returns `true` if the mirror was active. The origin cannot be disabled.
    pub fn disable(&mut self, host_key: &str) -> bool {
        match self
            .mirrors
            .iter_mut()
            .find(|m| m.host_key == host_key && !m.disabled)
        {
            Some(mirror) => {
                mirror.disabled = true;
                true
            }
            None => false,
        }
    }
}
