//! # notion: Source Reader
//!
//! Reads the configured root from the Notion API and turns it into a list of
//! [`Document`]s, one per page.
//!
//! - Root resolution: a database probe on the root id; anything other than a
//!   successful response with `object == "database"` falls back to page mode.
//! - Database mode: every member page is exported under a directory named after
//!   the database title.
//! - Page mode: the block tree of each page is walked depth-first and rendered with
//!   [`Block::to_markdown`]; `child_page` blocks become placeholders and are exported
//!   as their own documents under the parent's directory.
//!
//! Documents come out in depth-first pre-order: a page before its sub-pages.
//!
//! # Error Handling
//! Only root failures surface ([`SyncError::SourceUnavailable`]). A page whose
//! top-level children cannot be read is omitted; a failed nested read drops only
//! that subtree; malformed or repeated blocks are skipped. All of these are logged.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::HeaderName;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::NotionConfig;
use crate::contract::{ApiError, Document, DocumentSource, ListPage, NotionApi, SyncError};
use crate::http::{bearer_client, read_json};
use crate::markdown::{
    combine, database_title, page_title, path_segment, sanitize, Block, BlockKind,
    DATABASE_FALLBACK_TITLE, PAGE_FALLBACK_TITLE,
};

pub const PAGE_SIZE: u32 = 100;

const NOTION_VERSION: HeaderName = HeaderName::from_static("notion-version");

/// [`NotionApi`] over HTTP.
pub struct NotionHttpClient {
    client: Client,
    base_url: String,
}

impl NotionHttpClient {
    pub fn new(config: &NotionConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = bearer_client(
            &config.api_key,
            &[(NOTION_VERSION, config.version.as_str())],
            timeout,
        )?;
        info!(base_url = %config.base_url, version = %config.version, "Initialized Notion client");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NotionApi for NotionHttpClient {
    async fn get_database(&self, id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/databases/{}", self.base_url, id);
        debug!(url = %url, "GET database");
        read_json(self.client.get(&url).send().await?).await
    }

    async fn query_database(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError> {
        let url = format!("{}/databases/{}/query", self.base_url, id);
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor);
        }
        debug!(url = %url, "POST database query");
        let value = read_json(self.client.post(&url).json(&body).send().await?).await?;
        Ok(ListPage::from_json(&value))
    }

    async fn get_page(&self, id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/pages/{}", self.base_url, id);
        debug!(url = %url, "GET page");
        read_json(self.client.get(&url).send().await?).await
    }

    async fn list_block_children(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError> {
        let url = format!("{}/blocks/{}/children", self.base_url, id);
        let mut query = vec![("page_size", PAGE_SIZE.to_string())];
        if let Some(cursor) = start_cursor {
            query.push(("start_cursor", cursor));
        }
        debug!(url = %url, "GET block children");
        let value = read_json(self.client.get(&url).query(&query).send().await?).await?;
        Ok(ListPage::from_json(&value))
    }
}

/// Reads every page of a cursor-paginated list endpoint.
async fn collect_all<F, Fut>(what: &str, id: &str, mut fetch: F) -> Result<Vec<Value>, ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage, ApiError>>,
{
    let mut results = Vec::new();
    let mut cursor = None;
    let mut seen_cursors = HashSet::new();
    loop {
        let page = fetch(cursor.take()).await?;
        results.extend(page.results);
        match (page.has_more, page.next_cursor) {
            (true, Some(next)) if !seen_cursors.insert(next.clone()) => {
                warn!(what, id, cursor = %next, "next_cursor repeated, stopping pagination");
                break;
            }
            (true, Some(next)) => cursor = Some(next),
            (true, None) => {
                warn!(what, id, "has_more without next_cursor, stopping pagination");
                break;
            }
            (false, _) => break,
        }
    }
    Ok(results)
}

/// A page waiting to be exported.
#[derive(Debug, Clone)]
struct PendingPage {
    id: String,
    parent_dir: String,
    /// Title carried by the `child_page` block that referenced this page.
    title_hint: Option<String>,
    is_root: bool,
}

/// Lines and sub-page references collected while walking one page.
#[derive(Debug, Default)]
struct PageWalk {
    lines: Vec<String>,
    sub_pages: Vec<(String, String)>,
}

/// Per-sync bookkeeping: what was visited and which paths are taken.
#[derive(Debug, Default)]
struct Traversal {
    visited_pages: HashSet<String>,
    visited_blocks: HashSet<String>,
    files: HashSet<String>,
    dirs: HashSet<String>,
    documents: Vec<Document>,
}

impl Traversal {
    /// Reserves a unique `(directory, file path)` for a page.
    ///
    /// A path is never used both as a file and as a directory.
    fn claim_path(&mut self, parent_dir: &str, segment: &str, page_id: &str) -> (String, String) {
        let short_id: String = sanitize(&page_id.replace('-', "")).chars().take(8).collect();
        let mut candidate = segment.to_string();
        let mut attempt = 0;
        loop {
            let dir = combine(parent_dir, &candidate);
            let path = combine(&dir, &format!("{candidate}.md"));
            let free = !self.files.contains(&path)
                && !self.dirs.contains(&path)
                && !self.files.contains(&dir);
            if free {
                self.files.insert(path.clone());
                self.dirs.insert(dir.clone());
                return (dir, path);
            }
            attempt += 1;
            candidate = if attempt == 1 {
                format!("{segment}-{short_id}")
            } else {
                format!("{segment}-{short_id}-{attempt}")
            };
            warn!(page_id, path = %path, "Document path already taken, disambiguating");
        }
    }
}

/// Source Reader: exports the page tree under one root id.
pub struct NotionReader<A> {
    api: A,
    root_id: String,
}

impl<A: NotionApi> NotionReader<A> {
    pub fn new(api: A, root_id: impl Into<String>) -> Self {
        Self {
            api,
            root_id: root_id.into(),
        }
    }

    /// Produces one document per reachable page, parents before their sub-pages.
    pub async fn export(&self) -> Result<Vec<Document>, SyncError> {
        info!(root_id = %self.root_id, "[NOTION] Resolving export root");
        let mut traversal = Traversal::default();
        let mut stack: Vec<PendingPage> = Vec::new();

        match self.api.get_database(&self.root_id).await {
            Ok(database) if database.get("object").and_then(Value::as_str) == Some("database") => {
                let title = database_title(&database);
                let dir = path_segment(title.as_deref(), DATABASE_FALLBACK_TITLE);
                info!(root_id = %self.root_id, dir = %dir, "[NOTION] Root is a database");
                let members = self.database_members(&self.root_id).await?;
                stack.extend(members.into_iter().rev().map(|id| PendingPage {
                    id,
                    parent_dir: dir.clone(),
                    title_hint: None,
                    is_root: false,
                }));
            }
            Ok(other) => {
                debug!(object = ?other.get("object"), "[NOTION] Root is not a database, using page mode");
                stack.push(self.root_page());
            }
            Err(e) => {
                debug!(error = %e, "[NOTION] Database probe failed, using page mode");
                stack.push(self.root_page());
            }
        }

        while let Some(pending) = stack.pop() {
            let sub_pages = self.export_page(&pending, &mut traversal).await?;
            stack.extend(sub_pages.into_iter().rev());
        }

        info!(documents = traversal.documents.len(), "[NOTION] Export finished");
        Ok(traversal.documents)
    }

    fn root_page(&self) -> PendingPage {
        PendingPage {
            id: self.root_id.clone(),
            parent_dir: String::new(),
            title_hint: None,
            is_root: true,
        }
    }

    async fn database_members(&self, database_id: &str) -> Result<Vec<String>, SyncError> {
        let results = collect_all("database query", database_id, |cursor| {
            self.api.query_database(database_id, cursor)
        })
        .await
        .map_err(|e| {
            error!(database_id, error = %e, "[NOTION][ERROR] Database query failed");
            SyncError::SourceUnavailable(format!("query of database {database_id} failed: {e}"))
        })?;

        Ok(results
            .iter()
            .filter_map(|entry| match entry.get("id").and_then(Value::as_str) {
                Some(id) => Some(id.to_string()),
                None => {
                    warn!(database_id, "Database entry without id, skipping");
                    None
                }
            })
            .collect())
    }

    /// Exports one page and returns its sub-pages, ready to be queued.
    async fn export_page(
        &self,
        pending: &PendingPage,
        traversal: &mut Traversal,
    ) -> Result<Vec<PendingPage>, SyncError> {
        let page_id = pending.id.as_str();
        if !traversal.visited_pages.insert(page_id.to_string()) {
            let revisit = SyncError::MalformedBlock {
                id: page_id.to_string(),
                reason: "page already exported in this sync".into(),
            };
            warn!(error = %revisit, "[NOTION] Skipping revisited page");
            return Ok(Vec::new());
        }

        let title = match self.api.get_page(page_id).await {
            Ok(page) => page_title(&page),
            Err(e) => {
                warn!(page_id, error = %e, "[NOTION] Page metadata unavailable, using fallback title");
                None
            }
        }
        .or_else(|| pending.title_hint.clone());
        let segment = path_segment(title.as_deref(), PAGE_FALLBACK_TITLE);

        let mut walk = PageWalk::default();
        if let Err(e) = self.walk_blocks(page_id, 0, traversal, &mut walk).await {
            if pending.is_root {
                error!(page_id, error = %e, "[NOTION][ERROR] Root page content unavailable");
                return Err(SyncError::SourceUnavailable(format!(
                    "children of root page {page_id} could not be read: {e}"
                )));
            }
            let partial = SyncError::PartialSourceRead {
                id: page_id.to_string(),
                reason: e.to_string(),
            };
            warn!(error = %partial, "[NOTION] Omitting page whose content could not be read");
            return Ok(Vec::new());
        }

        let (dir, path) = traversal.claim_path(&pending.parent_dir, &segment, page_id);
        info!(page_id, path = %path, lines = walk.lines.len(), sub_pages = walk.sub_pages.len(), "[NOTION] Exported page");
        traversal
            .documents
            .push(Document::new(path, walk.lines.join("\n")));

        Ok(walk
            .sub_pages
            .into_iter()
            .map(|(id, title)| PendingPage {
                id,
                parent_dir: dir.clone(),
                title_hint: Some(title).filter(|t| !t.is_empty()),
                is_root: false,
            })
            .collect())
    }

    /// Appends the Markdown of every descendant of `block_id` to `walk`.
    ///
    /// Fails only if the children of `block_id` itself cannot be read; failures
    /// further down are logged and the affected subtree is left out.
    fn walk_blocks<'a>(
        &'a self,
        block_id: &'a str,
        depth: usize,
        traversal: &'a mut Traversal,
        walk: &'a mut PageWalk,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        async move {
            let children = collect_all("block children", block_id, |cursor| {
                self.api.list_block_children(block_id, cursor)
            })
            .await?;

            for raw in &children {
                let block = match Block::from_json(raw) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(parent = block_id, error = %e, "[NOTION] Skipping malformed block");
                        continue;
                    }
                };
                if !traversal.visited_blocks.insert(block.id.clone()) {
                    warn!(block_id = %block.id, "[NOTION] Block already visited, skipping");
                    continue;
                }

                walk.lines.extend(block.to_markdown(depth));
                if let BlockKind::ChildPage { title } = &block.kind {
                    walk.sub_pages.push((block.id.clone(), title.clone()));
                    continue;
                }

                if block.has_children {
                    if let Err(e) = self
                        .walk_blocks(&block.id, depth + 1, &mut *traversal, &mut *walk)
                        .await
                    {
                        let partial = SyncError::PartialSourceRead {
                            id: block.id.clone(),
                            reason: e.to_string(),
                        };
                        warn!(error = %partial, "[NOTION] Leaving out unreadable subtree");
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl<A: NotionApi> DocumentSource for NotionReader<A> {
    async fn fetch_documents(&self) -> Result<Vec<Document>, SyncError> {
        self.export().await
    }
}
