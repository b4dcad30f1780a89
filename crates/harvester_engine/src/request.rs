use std::sync::Arc;

use url::Url;

use crate::{FetchError, FetchFailure};

/// Static header and query-parameter template shared read-only by all tasks of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestProfile {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl RequestProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }
}

/// One request, owned by the task that issues it.
///
/// Built from the shared profile plus task-local overrides (page index,
/// category); the profile itself is never mutated.
#[derive(Debug, Clone)]
pub struct PageRequest {
    url: Url,
    profile: Arc<RequestProfile>,
}

impl PageRequest {
    /// Template query parameters are emitted in order, with overridden values
    /// substituted in place; overrides not in the template are appended.
    pub fn new(
        profile: &Arc<RequestProfile>,
        base_url: &str,
        overrides: &[(&str, String)],
    ) -> Result<Self, FetchError> {
        let mut url = Url::parse(base_url)
            .map_err(|err| FetchError::new(FetchFailure::InvalidRequest, format!("{base_url}: {err}")))?;

        let template = profile.query_params();
        let extra: Vec<_> = overrides
            .iter()
            .filter(|(name, _)| !template.iter().any(|(key, _)| key.as_str() == *name))
            .collect();
        if !template.is_empty() || !extra.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in template {
                let value = overrides
                    .iter()
                    .find(|(name, _)| *name == key.as_str())
                    .map(|(_, v)| v.as_str())
                    .unwrap_or(value.as_str());
                pairs.append_pair(key, value);
            }
            for (name, value) in extra {
                pairs.append_pair(name, value);
            }
        }

        Ok(Self {
            url,
            profile: Arc::clone(profile),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.profile.headers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Arc<RequestProfile> {
        Arc::new(
            RequestProfile::new()
                .header("Appid", "Reactweb")
                .query("currentPage", "0")
                .query("pageSize", "60"),
        )
    }

    #[test]
    fn overrides_replace_template_values_in_place() {
        let request = PageRequest::new(
            &profile(),
            "https://shop.example/api/categories/F1",
            &[("currentPage", "3".to_string())],
        )
        .unwrap();
        assert_eq!(request.url().query(), Some("currentPage=3&pageSize=60"));
    }

    #[test]
    fn unknown_overrides_are_appended() {
        let request = PageRequest::new(
            &Arc::new(RequestProfile::new()),
            "https://shop.example/catalogue/",
            &[("page", "2".to_string())],
        )
        .unwrap();
        assert_eq!(request.url().as_str(), "https://shop.example/catalogue/?page=2");
    }

    #[test]
    fn empty_query_leaves_url_untouched() {
        let request = PageRequest::new(
            &Arc::new(RequestProfile::new()),
            "https://shop.example/catalogue/",
            &[],
        )
        .unwrap();
        assert_eq!(request.url().as_str(), "https://shop.example/catalogue/");
    }

    #[test]
    fn requests_do_not_share_page_state() {
        let profile = profile();
        let first = PageRequest::new(&profile, "https://a.example/x", &[("currentPage", "1".into())]).unwrap();
        let second = PageRequest::new(&profile, "https://a.example/x", &[("currentPage", "2".into())]).unwrap();
        assert!(first.url().as_str().contains("currentPage=1"));
        assert!(second.url().as_str().contains("currentPage=2"));
        assert_eq!(profile.query_params()[0].1, "0");
    }
}
