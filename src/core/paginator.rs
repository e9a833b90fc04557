//! Continuation-token pagination over the ledger's event query.
//!
//! [`EventPages`] turns the token protocol into a lazy, finite sequence of
//! pages: the first request carries no token, each response may carry the
//! token for the next one, and the sequence ends when a response carries
//! none. A sequence is consumed once; a new tick builds a new one.

use crate::types::RawEvent;
use crate::utils::error::{KeeperError, Result};
use crate::utils::rpc::{EventQuery, LedgerGateway};

/// Default bound on pages fetched per tick.
pub const DEFAULT_MAX_PAGES: usize = 64;

/// Tick-local scan position: the query plus the in-flight continuation token.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    pub query: EventQuery,
    pub token: Option<String>,
}

impl ScanCursor {
    #[must_use]
    pub fn new(query: EventQuery) -> Self {
        Self { query, token: None }
    }
}

/// Lazy page sequence for one [`EventQuery`].
pub struct EventPages<'a> {
    gateway: &'a dyn LedgerGateway,
    cursor: ScanCursor,
    max_pages: usize,
    fetched: usize,
    done: bool,
}

impl<'a> EventPages<'a> {
    #[must_use]
    pub fn new(gateway: &'a dyn LedgerGateway, query: EventQuery, max_pages: usize) -> Self {
        Self {
            gateway,
            cursor: ScanCursor::new(query),
            max_pages,
            fetched: 0,
            done: false,
        }
    }

    /// Pages fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    /// Fetches the next page. `Ok(None)` once the sequence is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors, and returns `KeeperError::PaginationOverflow`
    /// if the ledger still offers a token after `max_pages` pages. Either
    /// error ends the sequence.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawEvent>>> {
        if self.done {
            return Ok(None);
        }

        if self.fetched >= self.max_pages {
            self.done = true;
            return Err(KeeperError::PaginationOverflow {
                pages: self.fetched,
            });
        }

        let page = match self
            .gateway
            .get_events(&self.cursor.query, self.cursor.token.take())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };
        self.fetched += 1;

        tracing::trace!(
            page = self.fetched,
            events = page.events.len(),
            more = page.continuation_token.is_some(),
            "Fetched event page"
        );

        match page.continuation_token {
            Some(token) => self.cursor.token = Some(token),
            None => self.done = true,
        }

        Ok(Some(page.events))
    }

    /// Drains the sequence, concatenating pages in ledger order.
    ///
    /// # Errors
    ///
    /// See [`EventPages::next_page`]. Nothing is returned on error.
    pub async fn collect_all(mut self) -> Result<Vec<RawEvent>> {
        let mut events = Vec::new();
        while let Some(page) = self.next_page().await? {
            events.extend(page);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::BlockWindow;
    use crate::types::EventsPage;
    use crate::utils::rpc::TerminalStatus;
    use async_trait::async_trait;
    use starknet::core::types::Felt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Serves `pages` in order; with `endless`, always returns a token.
    struct PagedGateway {
        pages: Vec<Vec<u64>>,
        endless: bool,
        calls: AtomicU32,
        tokens_seen: Mutex<Vec<Option<String>>>,
    }

    impl PagedGateway {
        fn new(pages: Vec<Vec<u64>>, endless: bool) -> Self {
            Self {
                pages,
                endless,
                calls: AtomicU32::new(0),
                tokens_seen: Mutex::new(Vec::new()),
            }
        }
    }

    fn raw(marker: u64) -> RawEvent {
        RawEvent {
            from_address: Felt::ONE,
            keys: vec![],
            data: vec![Felt::from(marker)],
            block_number: Some(1),
            transaction_hash: Felt::from(marker),
        }
    }

    #[async_trait]
    impl LedgerGateway for PagedGateway {
        async fn get_chain_head(&self) -> Result<u64> {
            Ok(0)
        }

        async fn get_events(&self, _: &EventQuery, token: Option<String>) -> Result<EventsPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.tokens_seen.lock().unwrap().push(token);
            let events = self
                .pages
                .get(n)
                .map(|p| p.iter().copied().map(raw).collect())
                .unwrap_or_default();
            let more = self.endless || n + 1 < self.pages.len();
            Ok(EventsPage {
                events,
                continuation_token: more.then(|| format!("t{}", n + 1)),
            })
        }

        async fn call(&self, _: Felt, _: &str, _: &[Felt]) -> Result<Vec<Felt>> {
            unimplemented!()
        }

        async fn estimate_fee(&self, _: Felt, _: &str, _: &[Felt]) -> Result<u128> {
            unimplemented!()
        }

        async fn invoke(&self, _: Felt, _: &str, _: &[Felt], _: u128) -> Result<Felt> {
            unimplemented!()
        }

        async fn wait_for_confirmation(&self, _: Felt) -> Result<TerminalStatus> {
            unimplemented!()
        }
    }

    fn query() -> EventQuery {
        EventQuery {
            address: Felt::ONE,
            window: BlockWindow {
                from_block: 998,
                to_block: 1000,
            },
            page_size: 2,
            keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_k_pages_k_fetches_in_order() {
        let gateway = PagedGateway::new(vec![vec![1, 2], vec![3, 4], vec![5]], false);
        let events = EventPages::new(&gateway, query(), DEFAULT_MAX_PAGES)
            .collect_all()
            .await
            .unwrap();

        let markers: Vec<_> = events.iter().map(|e| e.data[0]).collect();
        assert_eq!(markers, (1..=5u64).map(Felt::from).collect::<Vec<_>>());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *gateway.tokens_seen.lock().unwrap(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_single_page() {
        let gateway = PagedGateway::new(vec![vec![]], false);
        let events = EventPages::new(&gateway, query(), 4)
            .collect_all()
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_endless_token_overflows() {
        let gateway = PagedGateway::new(vec![vec![1]], true);
        let result = EventPages::new(&gateway, query(), 3).collect_all().await;

        assert!(matches!(
            result,
            Err(KeeperError::PaginationOverflow { pages: 3 })
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sequence_not_restartable() {
        let gateway = PagedGateway::new(vec![vec![1]], false);
        let mut pages = EventPages::new(&gateway, query(), 4);

        assert!(pages.next_page().await.unwrap().is_some());
        assert!(pages.next_page().await.unwrap().is_none());
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.pages_fetched(), 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }
}
