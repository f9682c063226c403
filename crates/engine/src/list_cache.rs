use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use techpack_core::page::total_pages;
use techpack_core::{Pagination, RecordId, RecordSummary};
use techpack_storage::LocalStore;

use crate::error::EngineError;
use crate::normalize::{ListPage, normalize_list};
use crate::transport::{ListQuery, Transport};

const LIST_CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedList {
    version: u32,
    query: ListQuery,
    page: ListPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
    Server,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListOutcome {
    pub page: ListPage,
    pub source: ListSource,
}

/// Last-known record list, persisted in the store's single list slot.
#[derive(Debug, Clone)]
pub struct ListCache {
    query: ListQuery,
    current: Option<ListPage>,
}

impl ListCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            query: ListQuery::first_page(page_size),
            current: None,
        }
    }

    /// Restore the persisted entry. An unreadable or outdated entry is
    /// ignored and the cache starts empty.
    pub fn load<S: LocalStore>(store: &S, page_size: u32) -> Self {
        let mut cache = Self::new(page_size);
        let stored = match store.get_list_cache() {
            Ok(Some(stored)) => stored,
            Ok(None) => return cache,
            Err(e) => {
                warn!(error = %e, "failed to read list cache");
                return cache;
            }
        };
        match rmp_serde::from_slice::<CachedList>(&stored.payload) {
            Ok(cached) if cached.version == LIST_CACHE_VERSION => {
                debug!(items = cached.page.items.len(), "restored list cache");
                cache.query = cached.query;
                cache.current = Some(cached.page);
            }
            Ok(cached) => {
                warn!(found = cached.version, expected = LIST_CACHE_VERSION, "ignoring outdated list cache");
            }
            Err(e) => warn!(error = %e, "ignoring unreadable list cache"),
        }
        cache
    }

    pub fn current(&self) -> Option<&ListPage> {
        self.current.as_ref()
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|page| page.items.iter().any(|item| &item.id == id))
    }

    async fn fetch<T: Transport + ?Sized>(
        transport: &T,
        query: &ListQuery,
    ) -> Result<ListPage, EngineError> {
        let body = transport.list_records(query).await?;
        normalize_list(&body, query)
    }

    /// Fetch a page, falling back to the cached entry when the server cannot
    /// be reached. An answer from the server, error or not, is never masked. A page index past the reported page count is refetched as
    /// page 1.
    pub async fn list<S: LocalStore, T: Transport + ?Sized>(
        &mut self,
        store: &mut S,
        transport: &T,
        query: ListQuery,
    ) -> Result<ListOutcome, EngineError> {
        let fetched = match Self::fetch(transport, &query).await {
            Ok(page) if query.page > 1 && query.page > page.pagination.total_pages.max(1) => {
                debug!(page = query.page, pages = page.pagination.total_pages, "page out of range, reloading first page");
                let first = query.with_page(1);
                Self::fetch(transport, &first).await.map(|page| (first, page))
            }
            Ok(page) => Ok((query, page)),
            Err(e) => Err(e),
        };

        match fetched {
            Ok((query, page)) => {
                self.accept(store, query, page.clone());
                Ok(ListOutcome {
                    page,
                    source: ListSource::Server,
                })
            }
            Err(EngineError::Transport(e)) if e.is_offline() && self.current.is_some() => {
                warn!(error = %e, "list fetch failed, serving cached list");
                let page = self.current.clone().unwrap_or_else(|| ListPage {
                    items: Vec::new(),
                    pagination: Pagination::default(),
                });
                Ok(ListOutcome {
                    page,
                    source: ListSource::Cache,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Reload the current query. On failure the cached state, optimistic
    /// mutations included, is kept.
    pub async fn refresh<S: LocalStore, T: Transport + ?Sized>(
        &mut self,
        store: &mut S,
        transport: &T,
    ) -> Result<ListPage, EngineError> {
        let query = self.query.clone();
        match Self::fetch(transport, &query).await {
            Ok(page) => {
                self.accept(store, query, page.clone());
                Ok(page)
            }
            Err(e) => {
                warn!(error = %e, "list refresh failed, keeping local list");
                Err(e)
            }
        }
    }

    fn accept<S: LocalStore>(&mut self, store: &mut S, query: ListQuery, page: ListPage) {
        self.query = query;
        self.current = Some(page);
        self.persist(store);
    }

    fn persist<S: LocalStore>(&self, store: &mut S) {
        let Some(page) = &self.current else {
            return;
        };
        let cached = CachedList {
            version: LIST_CACHE_VERSION,
            query: self.query.clone(),
            page: page.clone(),
        };
        let result = rmp_serde::to_vec_named(&cached)
            .map_err(|e| e.to_string())
            .and_then(|bytes| store.put_list_cache(&bytes).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist list cache");
        }
    }

    /// Apply `f` to the cached page. Without a cached page nothing happens.
    fn mutate<S: LocalStore>(&mut self, store: &mut S, f: impl FnOnce(&mut ListPage) -> bool) -> bool {
        let limit = self.query.limit;
        let Some(page) = self.current.as_mut() else {
            return false;
        };
        if !f(page) {
            return false;
        }
        page.pagination.total_pages = total_pages(page.pagination.total, limit);
        page.pagination = page.pagination.clamped();
        self.query.page = page.pagination.page;
        self.persist(store);
        true
    }

    /// Put `item` at the top of the list. An item already present is
    /// replaced in place instead. This is the only mutation that starts a
    /// list when none has been fetched yet.
    pub fn optimistic_insert<S: LocalStore>(&mut self, store: &mut S, item: RecordSummary) {
        info!(record = %item.id, "optimistic insert");
        self.current.get_or_insert_with(|| ListPage {
            items: Vec::new(),
            pagination: Pagination::default(),
        });
        self.mutate(store, |page| {
            match page.items.iter().position(|existing| existing.id == item.id) {
                Some(index) => page.items[index] = item,
                None => {
                    page.items.insert(0, item);
                    page.pagination.total += 1;
                }
            }
            true
        });
    }

    pub fn optimistic_remove<S: LocalStore>(&mut self, store: &mut S, id: &RecordId) -> bool {
        self.mutate(store, |page| {
            let before = page.items.len();
            page.items.retain(|item| &item.id != id);
            if page.items.len() == before {
                return false;
            }
            page.pagination.total = page.pagination.total.saturating_sub(1);
            true
        })
    }

    pub fn optimistic_replace<S: LocalStore>(
        &mut self,
        store: &mut S,
        id: &RecordId,
        item: RecordSummary,
    ) -> bool {
        self.mutate(store, |page| {
            match page.items.iter().position(|existing| &existing.id == id) {
                Some(index) => {
                    page.items[index] = item;
                    true
                }
                None => false,
            }
        })
    }
}
