#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[derive(Debug, Clone)]
pub struct StoredFolder {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub filename: String,
    pub folder_id: Option<i64>,
}

#[derive(Debug, Default)]
struct DeskState {
    folders: Vec<StoredFolder>,
    next_id: i64,
    creates: usize,
    uploads: Vec<StoredUpload>,
    existing_files: HashSet<String>,
    failing_files: HashSet<String>,
}

/// In-memory folder/document backend behind a wiremock server. Creating a sibling that
/// already exists answers with the backend's localized 400, like the real service.
#[derive(Clone, Default)]
pub struct FakeDesk {
    state: Arc<Mutex<DeskState>>,
    create_delay: Duration,
}

impl FakeDesk {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeskState {
                next_id: 100,
                ..DeskState::default()
            })),
            create_delay: Duration::from_millis(30),
        }
    }

    pub async fn start() -> (Self, MockServer) {
        let desk = Self::new();
        let server = MockServer::start().await;
        desk.mount(&server).await;
        (desk, server)
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/folders"))
            .respond_with(ListFolders(self.clone()))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/folders"))
            .respond_with(CreateFolder(self.clone()))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(UploadDocument(self.clone()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [],
                "currentPage": 0,
                "totalPages": 0
            })))
            .mount(server)
            .await;
    }

    pub fn seed_folder(&self, name: &str, parent_id: Option<i64>) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.folders.push(StoredFolder {
            id,
            name: name.to_string(),
            parent_id,
        });
        id
    }

    pub fn mark_existing(&self, filename: &str) {
        self.state.lock().existing_files.insert(filename.to_string());
    }

    pub fn mark_failing(&self, filename: &str) {
        self.state.lock().failing_files.insert(filename.to_string());
    }

    pub fn creates(&self) -> usize {
        self.state.lock().creates
    }

    pub fn folders(&self) -> Vec<StoredFolder> {
        self.state.lock().folders.clone()
    }

    pub fn folder_id(&self, name: &str, parent_id: Option<i64>) -> Option<i64> {
        self.state
            .lock()
            .folders
            .iter()
            .find(|folder| folder.name == name && folder.parent_id == parent_id)
            .map(|folder| folder.id)
    }

    pub fn uploads(&self) -> Vec<StoredUpload> {
        self.state.lock().uploads.clone()
    }
}

fn folder_json(folder: &StoredFolder) -> Value {
    json!({
        "id": folder.id,
        "name": folder.name,
        "parentId": folder.parent_id,
        "path": format!("/{}", folder.name),
        "depth": 0
    })
}

fn parent_from_query(request: &Request) -> Option<i64> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == "parentId")
        .and_then(|(_, value)| value.parse().ok())
}

struct ListFolders(FakeDesk);

impl Respond for ListFolders {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let parent = parent_from_query(request);
        let state = self.0.state.lock();
        let folders: Vec<Value> = state
            .folders
            .iter()
            .filter(|folder| folder.parent_id == parent)
            .map(folder_json)
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "folders": folders }))
    }
}

struct CreateFolder(FakeDesk);

impl Respond for CreateFolder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let parent_id = body["parentId"].as_i64();

        let mut state = self.0.state.lock();
        if state
            .folders
            .iter()
            .any(|folder| folder.name == name && folder.parent_id == parent_id)
        {
            return ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "同级文件夹名称不能重复" }));
        }
        state.next_id += 1;
        state.creates += 1;
        let folder = StoredFolder {
            id: state.next_id,
            name,
            parent_id,
        };
        state.folders.push(folder.clone());
        ResponseTemplate::new(200)
            .set_body_json(json!({ "message": "created", "folder": folder_json(&folder) }))
            .set_delay(self.0.create_delay)
    }
}

struct UploadDocument(FakeDesk);

impl Respond for UploadDocument {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let filename = between(&body, "filename=\"", "\"").unwrap_or_default();
        let folder_id = between(&body, "name=\"folderId\"\r\n\r\n", "\r\n").and_then(|v| v.parse().ok());

        let mut state = self.0.state.lock();
        if state.failing_files.contains(&filename) {
            return ResponseTemplate::new(500).set_body_json(json!({ "message": "storage unavailable" }));
        }
        if state.existing_files.contains(&filename) {
            return ResponseTemplate::new(200).set_body_json(json!({ "message": "文件已存在，跳过上传" }));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.uploads.push(StoredUpload {
            filename: filename.clone(),
            folder_id,
        });
        ResponseTemplate::new(200).set_body_json(json!({
            "message": "uploaded",
            "document": { "id": id, "filename": filename, "folderId": folder_id }
        }))
    }
}

fn between(haystack: &str, start: &str, end: &str) -> Option<String> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(haystack[from..from + len].to_string())
}
