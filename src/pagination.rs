//! Draining of paginated list endpoints.
//!
//! Fleet lists come in two styles: numbered pages with a `total`, and
//! `searchAfter` cursors. Both are drained until as many items as the server
//! reported in `total` have been read. A failed page discards everything read
//! so far; callers never see a truncated listing.

use crate::client::{KibanaClient, KibanaError, Result, decode_json};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `page=N`, starting at 1
    Counted,
    /// Opaque `searchAfter` value taken from the previous page
    SearchAfter,
}

/// Position of the next page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Page(u32),
    /// `None` on the first request
    SearchAfter(Option<String>),
}

impl Cursor {
    fn first(style: CursorStyle) -> Self {
        match style {
            CursorStyle::Counted => Self::Page(1),
            CursorStyle::SearchAfter => Self::SearchAfter(None),
        }
    }
}

/// Path and query parameters of one page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Append a query parameter; repeated keys are kept.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

// Unencoded, for log lines and error context only.
impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, k, v)?;
        }
        Ok(())
    }
}

/// One decoded page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    /// Cursor for the following page, for `searchAfter` listings
    pub next: Option<String>,
}

/// List response envelope.
///
/// Depending on the server version the list is under `response` or `list`
/// (older) or `items` (newer); some versions populate both. The older field
/// wins when it is non-empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    response: Vec<T>,
    #[serde(default = "Vec::new")]
    list: Vec<T>,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    search_after: Option<Vec<Value>>,
}

impl<T> ListEnvelope<T> {
    pub fn into_page(self) -> Page<T> {
        let next = self
            .search_after
            .filter(|s| !s.is_empty())
            .map(|s| Value::Array(s).to_string());
        let items = if !self.response.is_empty() {
            self.response
        } else if !self.list.is_empty() {
            self.list
        } else {
            self.items
        };
        Page {
            items,
            total: self.total,
            next,
        }
    }
}

/// Fetch pages until `total` items are read.
///
/// `request_for` builds the request for a cursor; `fetch` retrieves that
/// page. Errors are wrapped with the last request made.
pub async fn drain_pages<T, P, F, Fut>(
    style: CursorStyle,
    mut request_for: P,
    mut fetch: F,
) -> Result<Vec<T>>
where
    P: FnMut(&Cursor) -> PageRequest,
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all = Vec::new();
    let mut cursor = Cursor::first(style);

    loop {
        let request = request_for(&cursor);
        let path = request.to_string();
        let wrap = |source: KibanaError| KibanaError::Pagination {
            path: path.clone(),
            source: Box::new(source),
        };

        let page = fetch(request).await.map_err(wrap)?;
        let received = page.items.len();
        all.extend(page.items);
        log::debug!("{}: {} of {} item(s)", path, all.len(), page.total);

        if all.len() >= page.total {
            return Ok(all);
        }
        if received == 0 {
            return Err(wrap(KibanaError::InvalidRequest(format!(
                "empty page with {} of {} item(s) retrieved",
                all.len(),
                page.total
            ))));
        }

        cursor = match cursor {
            Cursor::Page(n) => Cursor::Page(n + 1),
            Cursor::SearchAfter(_) => match page.next {
                Some(next) => Cursor::SearchAfter(Some(next)),
                None => {
                    return Err(wrap(KibanaError::InvalidRequest(format!(
                        "page without searchAfter cursor with {} of {} item(s) retrieved",
                        all.len(),
                        page.total
                    ))));
                }
            },
        };
    }
}

impl KibanaClient {
    /// GET and decode one page of a list endpoint.
    pub(crate) async fn get_page<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: &PageRequest,
    ) -> Result<Page<T>> {
        let body = self
            .get_ok(operation, &request.path, &request.query_pairs())
            .await?;
        let envelope: ListEnvelope<T> = decode_json(operation, &body)?;
        Ok(envelope.into_page())
    }

    /// Drain a list endpoint whose pages share the [`ListEnvelope`] shape.
    pub(crate) async fn drain_list<T, P>(
        &self,
        operation: &str,
        style: CursorStyle,
        request_for: P,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&Cursor) -> PageRequest,
    {
        drain_pages(style, request_for, |request| async move {
            self.get_page(operation, &request).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    /// In-memory source of `total` numbered items, `per_page` at a time.
    fn fake_page(total: usize, per_page: usize, offset: usize) -> Page<usize> {
        let end = (offset + per_page).min(total);
        Page {
            items: (offset..end).collect(),
            total,
            next: (end < total).then(|| end.to_string()),
        }
    }

    fn counted_path(cursor: &Cursor) -> PageRequest {
        match cursor {
            Cursor::Page(n) => PageRequest::new("/items").param("page", n),
            Cursor::SearchAfter(after) => {
                PageRequest::new("/items").param("after", after.as_deref().unwrap_or("0"))
            }
        }
    }

    fn query_number(request: &PageRequest) -> usize {
        request.query[0].1.parse().unwrap()
    }

    #[tokio::test]
    async fn test_counted_drain_is_complete() {
        let items = drain_pages(CursorStyle::Counted, counted_path, |request| async move {
            let page = query_number(&request);
            Ok(fake_page(250, 100, (page - 1) * 100))
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 250);
        assert_eq!(items.iter().collect::<HashSet<_>>().len(), 250);
    }

    #[tokio::test]
    async fn test_search_after_drain_is_complete() {
        let mut requests = 0;
        let items = drain_pages(CursorStyle::SearchAfter, counted_path, |request| {
            requests += 1;
            async move { Ok(fake_page(250, 100, query_number(&request))) }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 250);
        assert_eq!(items.iter().collect::<HashSet<_>>().len(), 250);
        assert_eq!(requests, 3);
    }

    #[tokio::test]
    async fn test_empty_listing_needs_one_request() {
        let mut requests = 0;
        let items: Vec<usize> = drain_pages(CursorStyle::Counted, counted_path, |_| {
            requests += 1;
            async { Ok(fake_page(0, 100, 0)) }
        })
        .await
        .unwrap();
        assert!(items.is_empty());
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn test_missing_cursor_is_an_error() {
        let err = drain_pages(CursorStyle::SearchAfter, counted_path, |_| async {
            Ok(Page {
                items: vec![1, 2],
                total: 5,
                next: None,
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, KibanaError::Pagination { .. }));
    }

    #[tokio::test]
    async fn test_short_source_does_not_loop() {
        let err = drain_pages(CursorStyle::Counted, counted_path, |request| async move {
            // Claims 10 items but only ever serves 4.
            let mut page = fake_page(4, 4, (query_number(&request) - 1) * 4);
            page.total = 10;
            Ok(page)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, KibanaError::Pagination { .. }));
    }

    #[tokio::test]
    async fn test_failed_page_reports_path_and_discards_partial() {
        let result: Result<Vec<usize>> =
            drain_pages(CursorStyle::Counted, counted_path, |request| async move {
                if query_number(&request) == 2 {
                    Err(KibanaError::api("list items", request.path, 500, b"boom"))
                } else {
                    Ok(fake_page(250, 100, 0))
                }
            })
            .await;

        match result {
            Err(KibanaError::Pagination { path, source }) => {
                assert_eq!(path, "/items?page=2");
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_page_request_display() {
        let request = PageRequest::new("/api/fleet/agents")
            .param("kuery", "tags:\"R&D\"")
            .param("page", 2);
        assert_eq!(request.to_string(), "/api/fleet/agents?kuery=tags:\"R&D\"&page=2");
        assert_eq!(request.query_pairs()[0], ("kuery", "tags:\"R&D\""));
        assert_eq!(PageRequest::new("/items").to_string(), "/items");
    }

    #[test]
    fn test_envelope_prefers_old_field() {
        let envelope: ListEnvelope<String> = serde_json::from_value(json!({
            "response": ["old"],
            "items": ["new"],
            "total": 1
        }))
        .unwrap();
        assert_eq!(envelope.into_page().items, vec!["old".to_string()]);

        let envelope: ListEnvelope<String> = serde_json::from_value(json!({
            "response": [],
            "items": ["new"],
            "total": 1
        }))
        .unwrap();
        assert_eq!(envelope.into_page().items, vec!["new".to_string()]);

        let envelope: ListEnvelope<String> = serde_json::from_value(json!({
            "list": ["agent"],
            "items": ["other"],
            "total": 1
        }))
        .unwrap();
        assert_eq!(envelope.into_page().items, vec!["agent".to_string()]);
    }

    #[test]
    fn test_envelope_search_after_cursor() {
        let envelope: ListEnvelope<String> = serde_json::from_value(json!({
            "items": ["apache"],
            "total": 2,
            "searchAfter": ["apache"]
        }))
        .unwrap();
        assert_eq!(envelope.into_page().next.as_deref(), Some(r#"["apache"]"#));
    }
}
