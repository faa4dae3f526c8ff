use spin_sdk::http::Request;

use crate::config::posts_per_page;
use crate::core::query_params::parse_query_params;

/// One page of an ordered collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

pub struct Paginator<T> {
    items: Vec<T>,
    per_page: usize,
}

impl<T> Paginator<T> {
    pub fn new(items: Vec<T>, per_page: usize) -> Self {
        Self { items, per_page: per_page.max(1) }
    }

    pub fn num_pages(&self) -> usize {
        page_count(self.items.len(), self.per_page)
    }

    pub fn get_page(self, raw: Option<&str>) -> Page<T> {
        let num_pages = self.num_pages();
        let number = resolve_page(raw, num_pages);

        let total = self.items.len();
        let start = (number - 1) * self.per_page;
        let items = self.items.into_iter().skip(start).take(self.per_page).collect();

        Page { items, number, num_pages, total }
    }
}

/// Always at least one, so an empty collection still has a first page.
pub fn page_count(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page.max(1)).max(1)
}

/// Resolves a raw `page` value: missing or not a number gives the first
/// page, a number outside `1..=num_pages` gives the last one.
pub fn resolve_page(raw: Option<&str>, num_pages: usize) -> usize {
    match raw.map(|s| s.trim().parse::<i64>()) {
        None | Some(Err(_)) => 1,
        Some(Ok(n)) if n < 1 || n as usize > num_pages => num_pages,
        Some(Ok(n)) => n as usize,
    }
}

/// The raw `page` query parameter.
pub fn page_param(req: &Request) -> Option<String> {
    parse_query_params(&req.uri()).remove("page")
}

/// Slices `posts` to the page requested by the `page` query parameter.
pub fn paginate<T>(req: &Request, posts: Vec<T>) -> Page<T> {
    Paginator::new(posts, posts_per_page()).get_page(page_param(req).as_deref())
}
