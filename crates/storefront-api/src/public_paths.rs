//! Routes that are readable without credentials
//!
//! Matching is done on the path alone: query string and fragment are cut
//! off, the configured base URL prefix is removed, and each rule is an
//! anchored, case-insensitive regular expression. Only `GET` requests are
//! ever public.
//!
//! Absolute URLs on another origin never carry credentials at all; see
//! [`PublicPathSet::is_backend_url`].

use regex::{Regex, RegexBuilder};
use reqwest::Method;
use url::Url;

/// Catalog reads that the backend serves anonymously.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    r"^/api/products/?$",
    r"^/api/products/[^/]+/?$",
    r"^/api/brands/?$",
    r"^/api/shipping-rates/?$",
    r"^/api/shipping/rates/?$",
];

#[derive(Debug, Clone)]
pub struct PublicPathSet {
    base_url: String,
    rules: Vec<Regex>,
}

impl PublicPathSet {
    /// Compile `patterns` in order. `base_url` is the prefix removed from
    /// absolute request URLs before matching.
    pub fn new<I, S>(base_url: &str, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            rules,
        })
    }

    pub fn with_defaults(base_url: &str) -> Result<Self, regex::Error> {
        Self::new(base_url, DEFAULT_PUBLIC_PATHS)
    }

    /// Whether a request with this method and URL is a public read.
    pub fn is_public_get(&self, method: &Method, url: &str) -> bool {
        *method == Method::GET && self.matches_path(&self.normalize(url))
    }

    /// Whether `url` is served by the configured backend. Relative URLs are
    /// resolved against the base, so they always are; absolute ones must
    /// share its scheme, host and port.
    pub fn is_backend_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(target) => Url::parse(&self.base_url)
                .is_ok_and(|base| base.origin() == target.origin()),
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(path))
    }

    /// Reduce a request URL to the path the rules are written against.
    pub fn normalize(&self, url: &str) -> String {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        let url = &url[..end];

        let path = match strip_prefix_ignore_case(url, &self.base_url) {
            Some(rest) => rest.to_string(),
            None if url.contains("://") => match Url::parse(url) {
                Ok(parsed) => parsed.path().to_string(),
                Err(_) => url.to_string(),
            },
            None => url.to_string(),
        };

        if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() || value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = value.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(rest)
}
