//! System URI matching against an access list

use crate::AccessEntry;
use serde_json::Value;
use url::Url;

/// Trailing path segment that absorbs the rest of a requested path
const WILDCARD: &str = "*";

/// A URI reduced to what matching compares: authority and path segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPath {
    host: String,
    segments: Vec<String>,
}

impl SystemPath {
    /// Parse a system URI; `None` for relative or host-less URIs
    pub fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return None,
        };
        let segments = url.path().split('/').map(str::to_string).collect();
        Some(Self { host, segments })
    }

    /// Same host, scheme ignored
    pub fn same_host(&self, other: &SystemPath) -> bool {
        self.host == other.host
    }

    /// Identical path segments
    pub fn exact_match(&self, requested: &SystemPath) -> bool {
        self.segments == requested.segments
    }

    /// `self` ends in `*` and every segment before it equals the requested
    /// segment at the same position. The request must reach the `*`
    /// position, so `/data/*` does not cover `/data`.
    pub fn wildcard_match(&self, requested: &SystemPath) -> bool {
        let Some((last, prefix)) = self.segments.split_last() else {
            return false;
        };
        if last != WILDCARD || requested.segments.len() < self.segments.len() {
            return false;
        }
        prefix
            .iter()
            .zip(&requested.segments)
            .all(|(granted, asked)| granted == asked)
    }
}

/// Find the rights `access_list` grants on `requested`
///
/// An exact path match anywhere in the list wins over wildcard matches;
/// among wildcards the first one in list order wins. Entries whose URI
/// does not parse are ignored.
pub fn match_system<'a>(requested: &str, access_list: &'a [AccessEntry]) -> Option<&'a Value> {
    let requested = SystemPath::parse(requested)?;
    let mut wildcard: Option<&Value> = None;

    for entry in access_list {
        let Some(granted) = SystemPath::parse(&entry.uri) else {
            continue;
        };
        if !granted.same_host(&requested) {
            continue;
        }
        if granted.exact_match(&requested) {
            return Some(&entry.rights);
        }
        if wildcard.is_none() && granted.wildcard_match(&requested) {
            wildcard = Some(&entry.rights);
        }
    }

    wildcard
}

/// True when `target` (a single granted URI) covers `requested`
pub fn covers(target: &str, requested: &str) -> bool {
    match (SystemPath::parse(target), SystemPath::parse(requested)) {
        (Some(granted), Some(asked)) => {
            granted.same_host(&asked)
                && (granted.exact_match(&asked) || granted.wildcard_match(&asked))
        }
        _ => false,
    }
}
