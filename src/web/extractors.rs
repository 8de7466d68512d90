//! Request parameter extraction

use serde::Deserialize;

/// Pagination and search parameters for console listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub q: Option<String>,
}

impl ListParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        match self.limit {
            Some(limit) if (1..=100).contains(&limit) => limit,
            _ => 50,
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page() - 1) * self.limit()
    }

    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_limit() {
        let params = ListParams {
            page: Some(0),
            limit: Some(1000),
            q: Some("   ".into()),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 50);
        assert_eq!(params.offset(), 0);
        assert!(params.query().is_none());

        let params = ListParams {
            page: Some(3),
            limit: Some(20),
            q: Some("team/".into()),
        };
        assert_eq!(params.offset(), 40);
        assert_eq!(params.query(), Some("team/"));
    }
}
