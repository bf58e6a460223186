use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/";

const NAME_CONFLICT_CODES: &[&str] = &["FOLDER_NAME_CONFLICT", "NAME_CONFLICT"];
const DUPLICATE_FILE_CODES: &[&str] = &["DUPLICATE_FILE", "FILE_EXISTS"];

// Phrases the current backend puts in plain-text error messages. Checked only after the
// structured code and the status, and kept here so there is a single place to retire them.
const DUPLICATE_FILE_PHRASES: &[&str] = &[
    "文件已存在",
    "file already exists",
    "document already exists",
];
// Folder wording only; a bare "already exists" also shows up in upload errors.
const NAME_CONFLICT_PHRASES: &[&str] = &[
    "同名",
    "名称不能重复",
    "folder already exists",
    "constraintviolation",
];

pub type FolderId = i64;
pub type DocumentId = i64;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Network,
    NameConflict,
    DuplicateFile,
    Validation,
    Permission,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DeskClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl DeskClient {
    pub fn new(base_url: &str) -> Result<Self, DeskError> {
        let mut base_url = Url::parse(base_url)?;
        // Endpoints are joined relative to the base, so a prefix like `/api` needs the slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: None,
        })
    }

    pub fn with_default_url() -> Result<Self, DeskError> {
        Self::new(DEFAULT_BASE_URL)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn list_folders(
        &self,
        parent_id: Option<FolderId>,
    ) -> Result<Vec<FolderRecord>, DeskError> {
        let mut url = self.endpoint("folders")?;
        if let Some(parent_id) = parent_id {
            url.query_pairs_mut()
                .append_pair("parentId", &parent_id.to_string());
        }
        let response = self.authorized(self.http.get(url)).send().await?;
        let payload: FolderListResponse = Self::handle_response(response).await?;
        Ok(payload.folders)
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<FolderId>,
    ) -> Result<FolderRecord, DeskError> {
        let url = self.endpoint("folders")?;
        let response = self
            .authorized(self.http.post(url))
            .json(&CreateFolderBody { name, parent_id })
            .send()
            .await?;
        let payload: FolderResponse = Self::handle_response(response).await?;
        Ok(payload.folder)
    }

    pub async fn rename_folder(&self, id: FolderId, name: &str) -> Result<FolderRecord, DeskError> {
        let url = self.endpoint(&format!("folders/{id}"))?;
        let response = self
            .authorized(self.http.put(url))
            .json(&RenameFolderBody { name })
            .send()
            .await?;
        let payload: FolderResponse = Self::handle_response(response).await?;
        Ok(payload.folder)
    }

    pub async fn move_folder(
        &self,
        id: FolderId,
        parent_id: Option<FolderId>,
    ) -> Result<FolderRecord, DeskError> {
        let url = self.endpoint(&format!("folders/{id}/move"))?;
        let response = self
            .authorized(self.http.put(url))
            .json(&MoveFolderBody { parent_id })
            .send()
            .await?;
        let payload: FolderResponse = Self::handle_response(response).await?;
        Ok(payload.folder)
    }

    pub async fn delete_folder(&self, id: FolderId) -> Result<FolderDeletion, DeskError> {
        let url = self.endpoint(&format!("folders/{id}"))?;
        let response = self.authorized(self.http.delete(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentPage, DeskError> {
        let mut url = self.endpoint("documents")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page.to_string());
            pairs.append_pair("size", &query.size.to_string());
            if let Some(folder_id) = query.folder_id {
                pairs.append_pair("folderId", &folder_id.to_string());
            }
            pairs.append_pair("root", if query.root { "true" } else { "false" });
        }
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn upload_document(&self, request: UploadRequest) -> Result<UploadReceipt, DeskError> {
        let url = self.endpoint("documents/upload")?;
        let part = Part::bytes(request.bytes)
            .file_name(request.file_name)
            .mime_str(&request.mime_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(folder_id) = request.folder_id {
            form = form.text("folderId", folder_id.to_string());
        }
        let response = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeskError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DeskError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DeskError::from_error_body(status, body))
        }
    }
}

impl DeskError {
    fn from_error_body(status: StatusCode, body: String) -> Self {
        let parsed = serde_json::from_str::<ApiErrorBody>(&body).ok();
        let code = parsed.as_ref().and_then(|b| b.code.clone());
        let message = parsed
            .and_then(|b| b.message.or(b.error))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    body
                }
            });
        DeskError::Api {
            status,
            code,
            message,
        }
    }

    pub fn classification(&self) -> ApiErrorClass {
        match self {
            DeskError::Request(err) if err.is_decode() => ApiErrorClass::Permanent,
            DeskError::Request(_) => ApiErrorClass::Network,
            DeskError::Url(_) => ApiErrorClass::Permanent,
            DeskError::Api {
                status,
                code,
                message,
            } => classify_api_error(*status, code.as_deref(), message),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DeskError::Api { status, .. } => Some(*status),
            DeskError::Request(err) => err.status(),
            DeskError::Url(_) => None,
        }
    }

    pub fn is_name_conflict(&self) -> bool {
        self.classification() == ApiErrorClass::NameConflict
    }

    pub fn is_duplicate_file(&self) -> bool {
        self.classification() == ApiErrorClass::DuplicateFile
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            ApiErrorClass::Network | ApiErrorClass::Transient
        )
    }
}

fn classify_api_error(status: StatusCode, code: Option<&str>, message: &str) -> ApiErrorClass {
    if let Some(code) = code {
        if NAME_CONFLICT_CODES.contains(&code) {
            return ApiErrorClass::NameConflict;
        }
        if DUPLICATE_FILE_CODES.contains(&code) {
            return ApiErrorClass::DuplicateFile;
        }
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return ApiErrorClass::Permission;
    }
    let conflict_capable = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::INTERNAL_SERVER_ERROR
    );
    if conflict_capable && is_duplicate_file_message(message) {
        return ApiErrorClass::DuplicateFile;
    }
    if conflict_capable && contains_phrase(message, NAME_CONFLICT_PHRASES) {
        return ApiErrorClass::NameConflict;
    }
    if status == StatusCode::CONFLICT {
        ApiErrorClass::NameConflict
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
    {
        ApiErrorClass::Transient
    } else if status.is_client_error() {
        ApiErrorClass::Validation
    } else {
        ApiErrorClass::Permanent
    }
}

fn is_duplicate_file_message(message: &str) -> bool {
    contains_phrase(message, DUPLICATE_FILE_PHRASES)
}

fn contains_phrase(message: &str, phrases: &[&str]) -> bool {
    let lower = message.to_lowercase();
    phrases.iter().any(|phrase| lower.contains(phrase))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: FolderId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FolderRef {
    pub id: FolderId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    #[serde(default, rename = "fileSize")]
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub folder: Option<FolderRef>,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
}

impl DocumentRecord {
    pub fn parent_folder_id(&self) -> Option<FolderId> {
        self.folder.as_ref().map(|f| f.id).or(self.folder_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentQuery {
    pub folder_id: Option<FolderId>,
    pub page: u32,
    pub size: u32,
    pub root: bool,
}

impl DocumentQuery {
    pub fn in_folder(folder_id: FolderId, page: u32, size: u32) -> Self {
        Self {
            folder_id: Some(folder_id),
            page,
            size,
            root: false,
        }
    }

    pub fn at_root(page: u32, size: u32) -> Self {
        Self {
            folder_id: None,
            page,
            size,
            root: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: u64,
}

impl DocumentPage {
    pub fn is_last_page(&self) -> bool {
        self.documents.is_empty() || self.current_page.saturating_add(1) >= self.total_pages
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub folder_id: Option<FolderId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub document: Option<DocumentRecord>,
    #[serde(default)]
    pub code: Option<String>,
}

impl UploadReceipt {
    /// The backend answers a re-upload with a success status and an "already exists" message.
    pub fn is_duplicate(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| DUPLICATE_FILE_CODES.contains(&code))
            || is_duplicate_file_message(&self.message)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDeletion {
    #[serde(default)]
    pub deleted_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct FolderListResponse {
    #[serde(default)]
    folders: Vec<FolderRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
struct FolderResponse {
    folder: FolderRecord,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderBody<'a> {
    name: &'a str,
    parent_id: Option<FolderId>,
}

#[derive(Serialize)]
struct RenameFolderBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveFolderBody {
    parent_id: Option<FolderId>,
}
