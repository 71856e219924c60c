use std::collections::BTreeSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    MediaList,
    Html,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MediaList => "page/media-list",
            Self::Html => "page/html",
        }
    }
}

/// Per-site REST endpoint availability discovered during one run. Marks only ever go
/// from supported to unsupported.
#[derive(Debug, Clone, Default)]
pub struct EndpointSupport {
    unsupported: BTreeSet<(String, Endpoint)>,
}

impl EndpointSupport {
    pub fn is_supported(&self, site: &str, endpoint: Endpoint) -> bool {
        !self.unsupported.contains(&(site.to_string(), endpoint))
    }

    /// Returns `true` the first time a site is marked for `endpoint`.
    pub fn mark_unsupported(&mut self, site: &str, endpoint: Endpoint) -> bool {
        self.unsupported.insert((site.to_string(), endpoint))
    }

    pub fn unsupported(&self) -> impl Iterator<Item = (&str, Endpoint)> {
        self.unsupported
            .iter()
            .map(|(site, endpoint)| (site.as_str(), *endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::{Endpoint, EndpointSupport};

    #[test]
    fn endpoints_are_tracked_independently_per_site() {
        let mut support = EndpointSupport::default();
        assert!(support.mark_unsupported("xx.wikipedia.org", Endpoint::Html));
        assert!(!support.mark_unsupported("xx.wikipedia.org", Endpoint::Html));

        assert!(!support.is_supported("xx.wikipedia.org", Endpoint::Html));
        assert!(support.is_supported("xx.wikipedia.org", Endpoint::MediaList));
        assert!(support.is_supported("yy.wikipedia.org", Endpoint::Html));
        assert_eq!(
            support.unsupported().collect::<Vec<_>>(),
            vec![("xx.wikipedia.org", Endpoint::Html)]
        );
    }
}
