use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
  pub page: Option<usize>,
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
  pub count: usize,
  pub total_pages: usize,
  pub page: usize,
  pub data: Vec<T>,
}

const DEFAULT_LIMIT: usize = 20;

/// `total_pages = count/limit` (integer division); `page` clamped to
/// `[1, max(1,total_pages)]` (§6 Pagination shape).
pub fn paginate<T: Clone>(items: &[T], query: &PageQuery) -> Page<T> {
  let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(1);
  let count = items.len();
  let total_pages = count / limit;
  let page = query.page.unwrap_or(1).clamp(1, total_pages.max(1));

  let start = (page - 1) * limit;
  let data = items.iter().skip(start).take(limit).cloned().collect();

  Page {
    count,
    total_pages,
    page,
    data,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_paginate_middle_page() {
    let items: Vec<i32> = (0..100).collect();
    let page = paginate(&items, &PageQuery { page: Some(3), limit: Some(10) });
    assert_eq!(page.count, 100);
    assert_eq!(page.total_pages, 10);
    assert_eq!(page.page, 3);
    assert_eq!(page.data, (20..30).collect::<Vec<_>>());
  }

  #[test]
  fn test_page_zero_clamps_to_one() {
    let items: Vec<i32> = (0..100).collect();
    let page = paginate(&items, &PageQuery { page: Some(0), limit: Some(10) });
    assert_eq!(page.page, 1);
  }

  #[test]
  fn test_page_beyond_range_clamps_to_last() {
    let items: Vec<i32> = (0..100).collect();
    let page = paginate(&items, &PageQuery { page: Some(999), limit: Some(10) });
    assert_eq!(page.page, 10);
  }

  #[test]
  fn test_empty_list_has_one_page() {
    let items: Vec<i32> = vec![];
    let page = paginate(&items, &PageQuery { page: Some(5), limit: Some(10) });
    assert_eq!(page.total_pages, 0);
    assert_eq!(page.page, 1);
    assert!(page.data.is_empty());
  }
}
