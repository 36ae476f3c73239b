//! End-to-end export scenarios against an in-memory Notion workspace and an
//! in-memory GitHub repository.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use notion_sync_core::contract::{
    ApiError, ContentsApi, Document, ListPage, NotionApi, PutContents, RemoteFile,
};
use notion_sync_core::github::GitHubWriter;
use notion_sync_core::notion::NotionReader;
use notion_sync_core::synchronise::Synchroniser;

fn rich(text: &str) -> Value {
    json!([{ "type": "text", "plain_text": text }])
}

fn titled_page(title: &str) -> Value {
    json!({
        "object": "page",
        "properties": { "Name": { "type": "title", "title": rich(title) } }
    })
}

fn text_block(id: &str, block_type: &str, text: &str) -> Value {
    let mut block = json!({ "id": id, "type": block_type, "has_children": false });
    block[block_type] = json!({ "rich_text": rich(text) });
    block
}

fn child_page_block(id: &str, title: &str) -> Value {
    json!({ "id": id, "type": "child_page", "has_children": true, "child_page": { "title": title } })
}

/// Notion workspace held in memory. List endpoints are split into pages of
/// `page_size` results to exercise cursor handling.
#[derive(Default)]
struct FakeNotion {
    databases: HashMap<String, Value>,
    members: HashMap<String, Vec<String>>,
    pages: HashMap<String, Value>,
    children: HashMap<String, Vec<Value>>,
    broken: HashSet<String>,
    page_size: usize,
}

impl FakeNotion {
    fn new() -> Self {
        Self {
            page_size: 100,
            ..Default::default()
        }
    }

    fn page(mut self, id: &str, title: &str, blocks: Vec<Value>) -> Self {
        self.pages.insert(id.into(), titled_page(title));
        self.children.insert(id.into(), blocks);
        self
    }

    fn database(mut self, id: &str, title: &str, members: &[&str]) -> Self {
        self.databases
            .insert(id.into(), json!({ "object": "database", "title": rich(title) }));
        self.members
            .insert(id.into(), members.iter().map(|m| m.to_string()).collect());
        self
    }

    fn slice(&self, items: Vec<Value>, cursor: Option<String>) -> ListPage {
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        ListPage {
            results: items[start..end].to_vec(),
            has_more: end < items.len(),
            next_cursor: (end < items.len()).then(|| end.to_string()),
        }
    }

    fn missing(id: &str) -> ApiError {
        ApiError::Status {
            status: 404,
            body: format!("{id} not found"),
        }
    }
}

#[async_trait]
impl NotionApi for FakeNotion {
    async fn get_database(&self, id: &str) -> Result<Value, ApiError> {
        self.databases.get(id).cloned().ok_or_else(|| Self::missing(id))
    }

    async fn query_database(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError> {
        let members = self.members.get(id).ok_or_else(|| Self::missing(id))?;
        let entries = members.iter().map(|m| json!({ "id": m })).collect();
        Ok(self.slice(entries, start_cursor))
    }

    async fn get_page(&self, id: &str) -> Result<Value, ApiError> {
        self.pages.get(id).cloned().ok_or_else(|| Self::missing(id))
    }

    async fn list_block_children(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError> {
        if self.broken.contains(id) {
            return Err(ApiError::Status {
                status: 500,
                body: "internal error".into(),
            });
        }
        let blocks = self.children.get(id).cloned().unwrap_or_default();
        Ok(self.slice(blocks, start_cursor))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PutRecord {
    path: String,
    sha: Option<String>,
}

/// GitHub repository held in memory, enforcing the conditional-update rules.
#[derive(Clone, Default)]
struct FakeRepo {
    files: Arc<Mutex<HashMap<String, (String, String)>>>,
    puts: Arc<Mutex<Vec<PutRecord>>>,
    revision: Arc<Mutex<u32>>,
}

impl FakeRepo {
    fn seed(&self, path: &str, content: &str, sha: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), (content.into(), sha.into()));
    }

    fn content(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(c, _)| c.clone())
    }

    fn sha(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(_, s)| s.clone())
    }

    fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentsApi for FakeRepo {
    async fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, ApiError> {
        assert_eq!(branch, "main");
        Ok(match self.sha(path) {
            Some(sha) => RemoteFile::present(path, Some(sha)),
            None => RemoteFile::absent(path),
        })
    }

    async fn put_file(&self, path: &str, body: PutContents) -> Result<(), ApiError> {
        self.puts.lock().unwrap().push(PutRecord {
            path: path.into(),
            sha: body.sha.clone(),
        });
        if self.sha(path) != body.sha {
            return Err(ApiError::Status {
                status: 409,
                body: "sha does not match".into(),
            });
        }
        let bytes = BASE64.decode(&body.content).expect("valid base64");
        let content = String::from_utf8(bytes).expect("utf-8 content");
        let mut revision = self.revision.lock().unwrap();
        *revision += 1;
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), (content, format!("sha-{revision}")));
        Ok(())
    }
}

fn synchroniser(notion: FakeNotion, root: &str, repo: &FakeRepo) -> Synchroniser {
    Synchroniser::new(
        Box::new(NotionReader::new(notion, root)),
        Box::new(GitHubWriter::new(repo.clone(), "main")),
    )
}

async fn export(notion: FakeNotion, root: &str) -> Vec<Document> {
    NotionReader::new(notion, root)
        .export()
        .await
        .expect("export succeeds")
}

fn assert_well_formed(documents: &[Document]) {
    let mut seen = HashSet::new();
    for doc in documents {
        assert!(doc.path.ends_with(".md"), "{} must end in .md", doc.path);
        for segment in doc.path.split('/') {
            assert!(!segment.is_empty(), "empty segment in {}", doc.path);
            assert!(
                segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c)),
                "unsafe segment {segment:?} in {}",
                doc.path
            );
        }
        assert!(seen.insert(doc.path.clone()), "duplicate path {}", doc.path);
    }
    for doc in documents {
        for (slash, _) in doc.path.match_indices('/') {
            let dir = &doc.path[..slash];
            assert!(
                !seen.contains(dir),
                "{dir} is both a file and a directory of {}",
                doc.path
            );
        }
    }
}

#[tokio::test]
async fn single_page_with_heading_and_paragraph() {
    let notion = FakeNotion::new().page(
        "hello",
        "Hello World",
        vec![
            text_block("h", "heading_1", "Notes"),
            text_block("p", "paragraph", "Line one."),
        ],
    );

    let documents = export(notion, "hello").await;
    assert_eq!(
        documents,
        vec![Document::new("Hello_World/Hello_World.md", "# Notes\nLine one.")]
    );
}

#[tokio::test]
async fn nested_sub_page_is_its_own_document() {
    let notion = FakeNotion::new()
        .page("a", "A", vec![child_page_block("b", "B")])
        .page("b", "B", vec![text_block("pb", "paragraph", "inside B")]);

    let documents = export(notion, "a").await;
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].path, "A/A.md");
    assert!(documents[0].markdown.contains("- B (sub-page)"));
    assert_eq!(documents[1], Document::new("A/B/B.md", "inside B"));
    assert_well_formed(&documents);
}

#[tokio::test]
async fn database_with_two_pages() {
    let notion = FakeNotion::new()
        .database("db", "Docs", &["p1", "p2"])
        .page("p1", "P1", vec![text_block("b1", "paragraph", "p1")])
        .page("p2", "P2", vec![text_block("b2", "paragraph", "p2")]);
    let repo = FakeRepo::default();

    let report = synchroniser(notion, "db", &repo)
        .sync()
        .await
        .expect("sync succeeds");

    assert_eq!(report.summary(), "Synced 2 file(s)");
    assert_eq!(repo.content("Docs/P1/P1.md").as_deref(), Some("p1"));
    assert_eq!(repo.content("Docs/P2/P2.md").as_deref(), Some("p2"));
}

#[tokio::test]
async fn empty_database_writes_nothing() {
    let notion = FakeNotion::new().database("db", "Docs", &[]);
    let repo = FakeRepo::default();

    let report = synchroniser(notion, "db", &repo).sync().await.unwrap();
    assert_eq!(report.summary(), "Synced 0 file(s)");
    assert!(repo.puts().is_empty());
}

#[tokio::test]
async fn to_do_and_code_blocks() {
    let mut done = text_block("t1", "to_do", "done");
    done["to_do"]["checked"] = json!(true);
    let mut next = text_block("t2", "to_do", "next");
    next["to_do"]["checked"] = json!(false);
    let mut code = text_block("c", "code", "print(1)");
    code["code"]["language"] = json!("python");

    let notion = FakeNotion::new().page("t", "T", vec![done, next, code]);
    let documents = export(notion, "t").await;
    assert_eq!(documents[0].path, "T/T.md");
    assert_eq!(
        documents[0].markdown,
        "- [x] done\n- [ ] next\n```python\nprint(1)\n```"
    );
}

#[tokio::test]
async fn idempotent_update_uses_current_digest() {
    let notion = || FakeNotion::new().page("a", "A", vec![text_block("p", "paragraph", "same")]);
    let repo = FakeRepo::default();
    repo.seed("A/A.md", "old", "d1");

    synchroniser(notion(), "a", &repo).sync().await.unwrap();
    let after_first = repo.content("A/A.md");
    let second_digest = repo.sha("A/A.md");
    let report = synchroniser(notion(), "a", &repo).sync().await.unwrap();

    assert_eq!(report.summary(), "Synced 1 file(s)");
    assert!(report.failed.is_empty());
    assert_eq!(repo.content("A/A.md"), after_first);
    assert_eq!(
        repo.puts(),
        vec![
            PutRecord {
                path: "A/A.md".into(),
                sha: Some("d1".into())
            },
            PutRecord {
                path: "A/A.md".into(),
                sha: second_digest
            },
        ]
    );
}

#[tokio::test]
async fn title_is_sanitized_into_path() {
    let notion = FakeNotion::new().page("x", " My Page / v2 ", vec![]);
    let documents = export(notion, "x").await;
    assert_eq!(documents[0].path, "My_Page_-_v2/My_Page_-_v2.md");
    assert_eq!(documents[0].markdown, "");
}

#[tokio::test]
async fn blank_title_uses_page_fallback() {
    let notion = FakeNotion::new().page("x", "   ", vec![text_block("p", "paragraph", "body")]);
    let documents = export(notion, "x").await;
    assert_eq!(documents[0].path, "page/page.md");
}

#[tokio::test]
async fn nested_blocks_are_indented_and_paginated() {
    let mut parent = text_block("li", "bulleted_list_item", "parent");
    parent["has_children"] = json!(true);
    let mut notion = FakeNotion::new()
        .page(
            "n",
            "N",
            vec![
                parent,
                text_block("n1", "numbered_list_item", "one"),
                text_block("n2", "numbered_list_item", "two"),
            ],
        );
    notion.children.insert(
        "li".into(),
        vec![
            text_block("c1", "bulleted_list_item", "child"),
            text_block("c2", "paragraph", ""),
        ],
    );
    notion.page_size = 1;

    let documents = export(notion, "n").await;
    assert_eq!(
        documents[0].markdown,
        "- parent\n  - child\n  \n1. one\n1. two"
    );
}

#[tokio::test]
async fn unreadable_sub_page_is_omitted_and_siblings_proceed() {
    let mut notion = FakeNotion::new()
        .page(
            "root",
            "Root",
            vec![child_page_block("bad", "Bad"), child_page_block("good", "Good")],
        )
        .page("bad", "Bad", vec![])
        .page("good", "Good", vec![text_block("g", "paragraph", "ok")]);
    notion.broken.insert("bad".into());

    let documents = export(notion, "root").await;
    let paths: Vec<_> = documents.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["Root/Root.md", "Root/Good/Good.md"]);
}

#[tokio::test]
async fn unreadable_nested_subtree_is_left_out() {
    let mut toggle = text_block("t", "toggle", "Details");
    toggle["has_children"] = json!(true);
    let mut notion = FakeNotion::new().page(
        "root",
        "Root",
        vec![toggle, text_block("after", "paragraph", "after")],
    );
    notion.broken.insert("t".into());

    let documents = export(notion, "root").await;
    assert_eq!(documents[0].markdown, "Details\nafter");
}

#[tokio::test]
async fn repeated_page_ids_are_exported_once() {
    let notion = FakeNotion::new()
        .page("a", "A", vec![child_page_block("b", "B")])
        .page("b", "B", vec![child_page_block("a", "A")]);

    let documents = export(notion, "a").await;
    let paths: Vec<_> = documents.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["A/A.md", "A/B/B.md"]);
}

#[tokio::test]
async fn sibling_pages_with_same_title_get_distinct_paths() {
    let notion = FakeNotion::new()
        .database("db", "Docs", &["11111111-aaaa", "22222222-bbbb"])
        .page("11111111-aaaa", "Same", vec![])
        .page("22222222-bbbb", "Same", vec![]);

    let documents = export(notion, "db").await;
    assert_eq!(documents[0].path, "Docs/Same/Same.md");
    assert_eq!(documents[1].path, "Docs/Same-22222222/Same-22222222.md");
    assert_well_formed(&documents);
}

#[tokio::test]
async fn sub_page_named_like_parent_file_gets_own_directory() {
    let notion = FakeNotion::new()
        .page("aaaaaaaa", "A", vec![child_page_block("bbbbbbbb-1", "A.md")])
        .page("bbbbbbbb-1", "A.md", vec![text_block("p", "paragraph", "inner")]);

    let documents = export(notion, "aaaaaaaa").await;
    let paths: Vec<_> = documents.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["A/A.md", "A/A.md-bbbbbbbb/A.md-bbbbbbbb.md"]
    );
    assert_well_formed(&documents);
}

#[tokio::test]
async fn malformed_block_is_skipped_and_siblings_render() {
    let notion = FakeNotion::new().page(
        "m",
        "Mixed",
        vec![
            text_block("a", "paragraph", "a"),
            json!({ "id": "bad", "type": "paragraph" }),
            text_block("b", "paragraph", "b"),
        ],
    );

    let documents = export(notion, "m").await;
    assert_eq!(documents, vec![Document::new("Mixed/Mixed.md", "a\nb")]);
}

#[tokio::test]
async fn sub_page_without_metadata_uses_block_title() {
    let mut notion = FakeNotion::new().page("a", "A", vec![child_page_block("b", "From Block")]);
    notion.children.insert("b".into(), vec![]);

    let documents = export(notion, "a").await;
    assert_eq!(documents[1].path, "A/From_Block/From_Block.md");
}

#[tokio::test]
async fn missing_root_is_source_unavailable() {
    let mut notion = FakeNotion::new();
    notion.broken.insert("ghost".into());
    let repo = FakeRepo::default();

    let err = synchroniser(notion, "ghost", &repo).sync().await.unwrap_err();
    assert!(err.to_string().contains("source unavailable"), "got {err}");
    assert!(repo.puts().is_empty());
}
