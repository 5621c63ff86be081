//! Cursor pagination over `links.next.after`.
//!
//! [`PageCursor`] tracks the traversal state and refuses to continue when
//! the provider hands back a cursor it has already seen or the page budget
//! runs out. [`collect_all`] drives it for the common "fetch everything"
//! case.

use crate::error::{LightroomError, Result};
use crate::types::{Links, Page};
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;

#[derive(Debug)]
pub struct PageCursor {
    after: Option<String>,
    seen: HashSet<String>,
    pages: usize,
    max_pages: usize,
    finished: bool,
}

impl PageCursor {
    pub fn new(max_pages: usize) -> Self {
        Self {
            after: None,
            seen: HashSet::new(),
            pages: 0,
            max_pages: max_pages.max(1),
            finished: false,
        }
    }

    /// Cursor to send with the next request; `None` for the first page.
    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Record the links of the page just fetched.
    ///
    /// # Errors
    ///
    /// - [`LightroomError::PaginationLoop`] on a repeated cursor or when
    ///   another page would exceed the budget
    /// - [`LightroomError::Decode`] when `next` carries no `after` cursor
    pub fn advance(&mut self, links: &Links) -> Result<()> {
        self.pages += 1;

        let Some(next) = &links.next else {
            self.finished = true;
            return Ok(());
        };
        let Some(after) = next.after.clone() else {
            return Err(LightroomError::Decode(
                "next link without an `after` cursor".to_string(),
            ));
        };

        if !self.seen.insert(after.clone()) || self.pages >= self.max_pages {
            return Err(LightroomError::PaginationLoop {
                cursor: after,
                pages: self.pages,
            });
        }

        self.after = Some(after);
        Ok(())
    }
}

/// Fetch every page, in order, and concatenate the resources.
///
/// `fetch` receives the cursor for the page to load.
pub async fn collect_all<T, F, Fut>(max_pages: usize, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut cursor = PageCursor::new(max_pages);
    let mut items = Vec::new();

    while !cursor.is_finished() {
        let page = fetch(cursor.after().map(str::to_string)).await?;
        cursor.advance(&page.links)?;
        items.extend(page.resources);
    }

    debug!(pages = cursor.pages(), items = items.len(), "Pagination complete");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NextLink;
    use std::sync::{Arc, Mutex};

    fn page(items: &[u32], after: Option<&str>) -> Page<u32> {
        Page {
            resources: items.to_vec(),
            links: Links {
                next: after.map(|a| NextLink {
                    after: Some(a.to_string()),
                    href: None,
                }),
            },
        }
    }

    #[tokio::test]
    async fn test_follows_cursor_chain() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = requested.clone();

        let items = collect_all(100, move |after| {
            log.lock().unwrap().push(after.clone());
            async move {
                Ok(match after.as_deref() {
                    None => page(&[1, 2], Some("c1")),
                    Some("c1") => page(&[3, 4], Some("c2")),
                    _ => page(&[5], None),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            *requested.lock().unwrap(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_a_loop() {
        let result = collect_all(100, |after| async move {
            Ok(match after {
                None => page(&[1], Some("a")),
                Some(_) => page(&[2], Some("a")),
            })
        })
        .await;

        assert!(matches!(
            result,
            Err(LightroomError::PaginationLoop { cursor, pages: 2 }) if cursor == "a"
        ));
    }

    #[tokio::test]
    async fn test_page_budget() {
        let counter = Arc::new(Mutex::new(0u32));
        let result = collect_all(5, |_| {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock().unwrap();
                *n += 1;
                let next = format!("c{}", n);
                Ok(page(&[*n], Some(&next)))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(LightroomError::PaginationLoop { pages: 5, .. })
        ));
        assert_eq!(*counter.lock().unwrap(), 5);
    }

    #[test]
    fn test_next_without_cursor() {
        let mut cursor = PageCursor::new(10);
        let links = Links {
            next: Some(NextLink::default()),
        };
        assert!(matches!(
            cursor.advance(&links),
            Err(LightroomError::Decode(_))
        ));
    }

    #[test]
    fn test_single_page() {
        let mut cursor = PageCursor::new(1);
        cursor.advance(&Links::default()).unwrap();
        assert!(cursor.is_finished());
        assert_eq!(cursor.pages(), 1);
    }
}
