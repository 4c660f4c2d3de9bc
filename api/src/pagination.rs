//! Paging query parameters and the `X-Total-Count` / `Link` response headers.

use application::ApplicationError;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use domain::{Page, PageRequest, SortBy};
use url::form_urlencoded;

pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_PAGE_SIZE,
            max_size: MAX_PAGE_SIZE,
        }
    }
}

/// Builds a [`PageRequest`] from raw `page`, `size` and (repeatable) `sort` parameters.
///
/// Bad `page`/`size` values fall back to their defaults; a bad `sort` is a client error.
/// `page` is capped so that `page * size` stays representable.
pub fn page_request(
    params: &[(String, String)],
    config: &PaginationConfig,
) -> Result<PageRequest, ApplicationError> {
    let mut page = 0;
    let mut size = config.default_size;
    let mut sort = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "page" => page = value.trim().parse::<usize>().unwrap_or(0),
            "size" => {
                size = match value.trim().parse::<usize>() {
                    Ok(requested) if requested >= 1 => requested.min(config.max_size),
                    _ => config.default_size,
                }
            }
            "sort" if !value.trim().is_empty() => sort.extend(SortBy::parse_expression(value)?),
            _ => {}
        }
    }

    let page = page.min(usize::MAX / size.max(1));
    Ok(PageRequest::new(page, size).with_sort(sort))
}

/// Headers for a page of the plain listing at `base_url`.
pub fn pagination_headers<T>(page: &Page<T>, base_url: &str) -> HeaderMap {
    headers_for(page, base_url, None)
}

/// Headers for a page of search results; every link repeats the form-encoded query.
pub fn search_pagination_headers<T>(query: &str, page: &Page<T>, base_url: &str) -> HeaderMap {
    let escaped: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
    headers_for(page, base_url, Some(&escaped))
}

fn headers_for<T>(page: &Page<T>, base_url: &str, escaped_query: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(page.total_elements));
    if let Ok(link) = HeaderValue::from_str(&link_header(page, base_url, escaped_query)) {
        headers.insert(header::LINK, link);
    }
    headers
}

fn link_header<T>(page: &Page<T>, base_url: &str, escaped_query: Option<&str>) -> String {
    let uri = |number: usize| {
        let mut uri = format!("{}?page={}&size={}", base_url, number, page.size);
        if let Some(query) = escaped_query {
            uri.push_str("&query=");
            uri.push_str(query);
        }
        uri
    };
    let link = |number: usize, rel: &str| format!("<{}>; rel=\"{}\"", uri(number), rel);

    let mut links = Vec::with_capacity(4);
    if page.has_next() {
        links.push(link(page.number.saturating_add(1), "next"));
    }
    if page.has_previous() {
        links.push(link(page.number - 1, "prev"));
    }
    links.push(link(page.total_pages().saturating_sub(1), "last"));
    links.push(link(0, "first"));
    links.join(",")
}
