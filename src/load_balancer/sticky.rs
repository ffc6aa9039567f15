//! Cookie-based sticky backend selection.
//!
//! The affinity cookie is the only session state: its value is the decimal
//! index of a backend in the registry. A missing, malformed or out-of-range
//! cookie falls back to a uniformly random pick and a fresh cookie.

use rand::Rng;

use crate::config::AffinityConfig;
use crate::http::headers::Headers;

/// Result of backend selection for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affinity {
    /// Index into the backend registry.
    pub index: usize,
    /// A valid affinity cookie selected `index`.
    pub found_existing: bool,
}

impl Affinity {
    /// A new affinity cookie has to be issued with the response.
    pub fn must_set_cookie(&self) -> bool {
        !self.found_existing
    }
}

/// Selects a backend index from the request's affinity cookie.
#[derive(Debug, Clone)]
pub struct StickySelector {
    cookie_name: String,
    max_age_secs: u64,
    path: String,
}

impl StickySelector {
    pub fn new(config: &AffinityConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            max_age_secs: config.max_age_secs,
            path: config.path.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Pick a backend index in `0..backend_count`. Never fails.
    ///
    /// # Panics
    /// If `backend_count` is zero; the registry guarantees it is not.
    pub fn select<R: Rng>(&self, headers: &Headers, backend_count: usize, rng: &mut R) -> Affinity {
        match self.cookie_index(headers, backend_count) {
            Some(index) => Affinity {
                index,
                found_existing: true,
            },
            None => Affinity {
                index: rng.gen_range(0..backend_count),
                found_existing: false,
            },
        }
    }

    /// First valid affinity value in the `Cookie` header.
    ///
    /// Segments without `=` are skipped. The value is everything after the
    /// first `=`, so `LB_NODE=1=2` is a non-integer and also skipped.
    fn cookie_index(&self, headers: &Headers, backend_count: usize) -> Option<usize> {
        let cookie = headers.get("Cookie")?;
        cookie
            .split(';')
            .filter_map(|segment| segment.split_once('='))
            .filter(|(name, _)| name.trim() == self.cookie_name)
            .filter_map(|(_, value)| value.trim().parse::<usize>().ok())
            .find(|&index| index < backend_count)
    }

    /// `Set-Cookie` value pinning the client to `index`.
    pub fn set_cookie_value(&self, index: usize) -> String {
        format!(
            "{}={}; Path={}; Max-Age={}",
            self.cookie_name, index, self.path, self.max_age_secs
        )
    }
}
