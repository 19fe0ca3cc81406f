//! Listing queries and cursor pagination

use crate::cursor::{Cursor, CursorDirection};
use crate::error::{Error, Result};
use crate::limits::validate_limit;
use serde::{Deserialize, Serialize};

/// Default page size when the caller gives none
pub const DEFAULT_LIMIT: i64 = 10;

/// Page size plus at most one cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_LIMIT)
    }
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self {
            limit,
            before: None,
            after: None,
        }
    }

    pub fn after(limit: i64, cursor: impl Into<String>) -> Self {
        Self {
            limit,
            before: None,
            after: Some(cursor.into()),
        }
    }

    pub fn before(limit: i64, cursor: impl Into<String>) -> Self {
        Self {
            limit,
            before: Some(cursor.into()),
            after: None,
        }
    }
}

/// Restricts a listing to entities under one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only entities whose FQN starts with `<container_fqn>.`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_fqn: Option<String>,
}

impl ListFilter {
    pub fn container(fqn: impl Into<String>) -> Self {
        Self {
            container_fqn: Some(fqn.into()),
        }
    }

    pub fn matches(&self, fqn: &str) -> bool {
        match &self.container_fqn {
            Some(prefix) => fqn
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
            None => true,
        }
    }
}

/// Cursors and total count accompanying a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub total: usize,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultList<T> {
    pub data: Vec<T>,
    pub paging: Paging,
}

impl<T> ResultList<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultList<U> {
        ResultList {
            data: self.data.into_iter().map(f).collect(),
            paging: self.paging,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bidirectional keyset pagination over a snapshot of rows
///
/// Cursors encode a sort-key boundary, never an offset, so rows inserted
/// between two page fetches cannot cause a row to be skipped or repeated.
pub struct CursorPager;

impl CursorPager {
    /// Cut one page out of `rows`, ordered ascending by `key`
    ///
    /// Keys must be unique within `rows`.
    pub fn paginate<T, F>(mut rows: Vec<T>, key: F, request: &PageRequest) -> Result<ResultList<T>>
    where
        F: Fn(&T) -> &str,
    {
        if request.before.is_some() && request.after.is_some() {
            return Err(Error::AmbiguousCursor);
        }
        let limit = validate_limit(request.limit)?;

        rows.sort_by(|a, b| key(a).cmp(key(b)));
        let total = rows.len();

        let (start, end) = match (&request.before, &request.after) {
            (Some(token), None) => {
                let boundary = Cursor::decode_expecting(token, CursorDirection::Before)?;
                let end = rows.partition_point(|r| key(r) < boundary.sort_key.as_str());
                (end.saturating_sub(limit), end)
            }
            (None, Some(token)) => {
                let boundary = Cursor::decode_expecting(token, CursorDirection::After)?;
                let start = rows.partition_point(|r| key(r) <= boundary.sort_key.as_str());
                (start, (start + limit).min(total))
            }
            _ => (0, limit.min(total)),
        };

        let data: Vec<T> = rows.drain(start..end).collect();
        let before = match data.first() {
            Some(first) if start > 0 => Some(Cursor::before(key(first)).encode()),
            _ => None,
        };
        let after = match data.last() {
            Some(last) if end < total => Some(Cursor::after(key(last)).encode()),
            _ => None,
        };

        tracing::debug!(
            "Paginated {} of {} rows (before={}, after={})",
            data.len(),
            total,
            before.is_some(),
            after.is_some()
        );

        Ok(ResultList {
            data,
            paging: Paging { before, after, total },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("svc.entity_{:04}", i)).collect()
    }

    fn page(rows: &[String], request: &PageRequest) -> Result<ResultList<String>> {
        CursorPager::paginate(rows.to_vec(), |s: &String| s.as_str(), request)
    }

    #[test]
    fn test_first_page_has_no_before_cursor() {
        let rows = names(5);
        let first = page(&rows, &PageRequest::first(2)).unwrap();
        assert_eq!(first.data, rows[..2].to_vec());
        assert!(first.paging.before.is_none());
        assert!(first.paging.after.is_some());
        assert_eq!(first.paging.total, 5);
    }

    #[test]
    fn test_last_page_has_no_after_cursor() {
        let rows = names(3);
        let first = page(&rows, &PageRequest::first(2)).unwrap();
        let second = page(&rows, &PageRequest::after(2, first.paging.after.unwrap())).unwrap();
        assert_eq!(second.data, vec![rows[2].clone()]);
        assert!(second.paging.after.is_none());
        assert!(second.paging.before.is_some());
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let rows = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let all = page(&rows, &PageRequest::first(10)).unwrap();
        assert_eq!(all.data, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_both_cursors_is_ambiguous() {
        let request = PageRequest {
            limit: 0,
            before: Some("x".into()),
            after: Some("y".into()),
        };
        // Ambiguity is reported before the limit is checked
        let err = page(&names(2), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousCursor);
    }

    #[test]
    fn test_limit_bounds() {
        let rows = names(2);
        for limit in [0, -1, 1_000_001] {
            let err = page(&rows, &PageRequest::first(limit)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidLimit);
        }
        assert!(page(&rows, &PageRequest::first(1)).is_ok());
        assert!(page(&rows, &PageRequest::first(1_000_000)).is_ok());
    }

    #[test]
    fn test_cursor_survives_concurrent_insert() {
        let mut rows = vec!["a".to_string(), "c".to_string(), "e".to_string()];
        let first = page(&rows, &PageRequest::first(2)).unwrap();
        assert_eq!(first.data, vec!["a", "c"]);

        rows.push("b".to_string());
        rows.push("d".to_string());
        let next = page(&rows, &PageRequest::after(2, first.paging.after.unwrap())).unwrap();
        assert_eq!(next.data, vec!["d", "e"]);
    }

    #[test]
    fn test_wrong_direction_cursor() {
        let rows = names(4);
        let first = page(&rows, &PageRequest::first(2)).unwrap();
        let after = first.paging.after.unwrap();
        let err = page(&rows, &PageRequest::before(2, after)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_container_filter() {
        let filter = ListFilter::container("airflow");
        assert!(filter.matches("airflow.etl"));
        assert!(!filter.matches("airflow2.etl"));
        assert!(!filter.matches("airflow"));
        assert!(ListFilter::default().matches("anything"));
    }

    proptest! {
        #[test]
        fn prop_forward_pages_cover_everything(total in 1usize..60, limit in 1usize..60) {
            let limit = limit.min(total);
            let rows = names(total);
            let mut seen = Vec::new();
            let mut request = PageRequest::first(limit as i64);
            loop {
                let result = page(&rows, &request).unwrap();
                seen.extend(result.data);
                match result.paging.after {
                    Some(after) => request = PageRequest::after(limit as i64, after),
                    None => break,
                }
            }
            prop_assert_eq!(seen, rows);
        }

        #[test]
        fn prop_before_cursor_returns_previous_page(total in 2usize..60, limit in 1usize..30) {
            let limit = limit.min(total) as i64;
            let rows = names(total);
            let mut previous: Option<ResultList<String>> = None;
            let mut request = PageRequest::first(limit);
            loop {
                let current = page(&rows, &request).unwrap();
                if let Some(prev) = &previous {
                    let before = current.paging.before.clone().unwrap();
                    let back = page(&rows, &PageRequest::before(limit, before)).unwrap();
                    prop_assert_eq!(&back.data, &prev.data);
                }
                let Some(after) = current.paging.after.clone() else { break };
                request = PageRequest::after(limit, after);
                previous = Some(current);
            }
        }
    }
}
