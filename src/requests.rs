// Request construction for the storage service.
//
// Everything in here is pure: URL building, form/JSON encoding, pagination
// arithmetic and response decoding. The blocking and async clients are thin
// adapters that feed these requests through their session.

use crate::config::normalize_base_url;
use crate::error::{Result, UFilesError};
use crate::http::{FilePart, HttpRequest, HttpResponse, Method, MultipartForm};
use crate::schemas::FileItem;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Filename sent when the caller gives none.
pub const DEFAULT_FILENAME: &str = "file";

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Where uploaded content comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Url(String),
}

/// Recognized upload fields plus a catch-all metadata mapping.
///
/// Each set field becomes one form field (or JSON key for URL uploads).
/// Mapping and sequence metadata values are sent as JSON strings in forms;
/// `null` values are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Only meaningful for uploads; `replace` takes its own flag.
    pub overwrite: Option<bool>,
    pub metadata: Map<String, Value>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn parent_id(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    /// Extra form field. Strings are sent raw, booleans and numbers as their
    /// JSON text (`true`, not `True`), maps and arrays as JSON strings.
    /// A null value drops the field.
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// All fields as JSON values, recognized ones first, nulls removed.
    fn entries(&self) -> Vec<(String, Value)> {
        let mut entries = Vec::new();
        if let Some(filename) = &self.filename {
            entries.push(("filename".to_string(), Value::from(filename.as_str())));
        }
        if let Some(content_type) = &self.content_type {
            entries.push(("content_type".to_string(), Value::from(content_type.as_str())));
        }
        if let Some(parent_id) = &self.parent_id {
            entries.push(("parent_id".to_string(), Value::from(parent_id.to_string())));
        }
        if let Some(overwrite) = self.overwrite {
            entries.push(("overwrite".to_string(), Value::from(overwrite)));
        }
        for (key, value) in &self.metadata {
            if !value.is_null() {
                entries.push((key.clone(), value.clone()));
            }
        }
        entries
    }

    /// Multipart text fields.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .map(|(key, value)| (key, form_value(&value)))
            .collect()
    }
}

/// Scalars pass through as their text; mappings and sequences become JSON.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Listing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub parent_id: Option<Uuid>,
    pub page_size: usize,
    /// When false, only the first page is fetched.
    pub all_pages: bool,
    /// Extra query parameters passed through to the service.
    pub filters: Vec<(String, String)>,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            parent_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            all_pages: true,
            filters: Vec::new(),
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_id(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn first_page_only(mut self) -> Self {
        self.all_pages = false;
        self
    }

    pub fn filter(mut self, key: &str, value: &str) -> Self {
        self.filters.push((key.to_string(), value.to_string()));
        self
    }
}

/// Offset cursor for the listing endpoint.
///
/// The offset advances by the number of items a page actually returned, so
/// short pages never cause a gap, and an empty page always ends the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    offset: usize,
    all_pages: bool,
    done: bool,
}

impl Pager {
    pub fn new(all_pages: bool) -> Self {
        Pager {
            offset: 0,
            all_pages,
            done: false,
        }
    }

    /// Offset of the next page to request, or `None` once finished.
    pub fn next_offset(&self) -> Option<usize> {
        if self.done {
            None
        } else {
            Some(self.offset)
        }
    }

    /// Record that the last requested page held `returned` items.
    pub fn advance(&mut self, returned: usize) {
        if returned == 0 || !self.all_pages {
            self.done = true;
        } else {
            self.offset += returned;
        }
    }
}

/// Reject anything that is not an `http://` or `https://` URL.
pub fn check_remote_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(UFilesError::InvalidInput(format!(
            "URL must start with http:// or https://, got {url}"
        )))
    }
}

/// Builds storage-service requests relative to one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequests {
    base_url: String,
}

impl FileRequests {
    pub fn new(base_url: &str) -> Self {
        FileRequests {
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn form(&self, bytes: Vec<u8>, options: &UploadOptions) -> MultipartForm {
        MultipartForm {
            fields: options.form_fields(),
            file: FilePart {
                name: "file".to_string(),
                filename: options
                    .filename
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
                content_type: options.content_type.clone(),
                bytes,
            },
        }
    }

    /// `POST {base}/upload`, multipart.
    pub fn upload_bytes(&self, bytes: Vec<u8>, options: &UploadOptions) -> HttpRequest {
        HttpRequest::new(Method::Post, format!("{}/upload", self.base_url))
            .multipart(self.form(bytes, options))
    }

    /// `POST {base}/url`, JSON `{url, ...metadata}`.
    pub fn upload_url(&self, url: &str, options: &UploadOptions) -> Result<HttpRequest> {
        check_remote_url(url)?;
        let mut body = Map::new();
        body.insert("url".to_string(), Value::from(url));
        for (key, value) in options.entries() {
            body.insert(key, value);
        }
        Ok(HttpRequest::new(Method::Post, format!("{}/url", self.base_url)).json(Value::Object(body)))
    }

    /// `PUT {base}/{uid}?overwrite=...`, multipart.
    pub fn replace_bytes(
        &self,
        uid: Uuid,
        bytes: Vec<u8>,
        overwrite: bool,
        options: &UploadOptions,
    ) -> HttpRequest {
        let options = UploadOptions {
            overwrite: None,
            ..options.clone()
        };
        HttpRequest::new(Method::Put, format!("{}/{}", self.base_url, uid))
            .query("overwrite", overwrite.to_string())
            .multipart(self.form(bytes, &options))
    }

    /// `GET {base}?parent_id=&offset=&limit=` plus caller filters.
    pub fn list_page(&self, options: &ListOptions, offset: usize) -> HttpRequest {
        let mut request = HttpRequest::new(Method::Get, self.base_url.as_str());
        if let Some(parent_id) = &options.parent_id {
            request = request.query("parent_id", parent_id.to_string());
        }
        request = request
            .query("offset", offset.to_string())
            .query("limit", options.page_size.to_string());
        for (key, value) in &options.filters {
            request = request.query(key.as_str(), value.as_str());
        }
        request
    }

    /// `DELETE {base}/{uid}`.
    pub fn delete(&self, uid: Uuid) -> HttpRequest {
        HttpRequest::new(Method::Delete, format!("{}/{}", self.base_url, uid))
    }
}

fn expect_success(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(UFilesError::RemoteError {
            status: response.status,
            body: response.text(),
        })
    }
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    items: Vec<FileItem>,
}

pub fn decode_item(response: HttpResponse) -> Result<FileItem> {
    expect_success(response)?.json()
}

pub fn decode_page(response: HttpResponse) -> Result<Vec<FileItem>> {
    let page: Page = expect_success(response)?.json()?;
    Ok(page.items)
}

/// The deletion result is passed through uninterpreted.
pub fn decode_deletion(response: HttpResponse) -> Result<Value> {
    let response = expect_success(response)?;
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    response.json()
}

/// `replace` only takes file or byte content.
pub(crate) fn url_replace_unsupported(url: &str) -> UFilesError {
    UFilesError::InvalidInput(format!(
        "replace takes file or byte content, not a URL ({url})"
    ))
}

/// Map a missing local file to [`UFilesError::NotFound`].
pub(crate) fn read_error(path: PathBuf, err: std::io::Error) -> UFilesError {
    if err.kind() == std::io::ErrorKind::NotFound {
        UFilesError::NotFound(path)
    } else {
        UFilesError::Io(err)
    }
}

/// Hex MD5 digest of `bytes`, comparable with [`FileItem::filehash`].
pub fn file_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// [`file_hash`] of a local file, read in 8 KiB chunks.
pub fn file_hash_path(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| read_error(path.to_path_buf(), e))?;
    let mut context = md5::Context::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use serde_json::json;

    fn requests() -> FileRequests {
        FileRequests::new("https://media.example.io/v1/f/")
    }

    #[test]
    fn test_form_fields_encode_nested_values_as_json() {
        let options = UploadOptions::new()
            .filename("cat.png")
            .meta("tags", json!(["a", "b"]))
            .meta("exif", json!({"w": 10, "nested": {"h": [1, 2]}}))
            .meta("count", 3)
            .meta("public", true)
            .meta("note", "plain")
            .meta("gone", Value::Null);

        let fields: Map<String, Value> = options
            .form_fields()
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();

        assert_eq!(fields["filename"], "cat.png");
        assert_eq!(fields["count"], "3");
        assert_eq!(fields["public"], "true");
        assert_eq!(fields["note"], "plain");
        assert!(!fields.contains_key("gone"));

        let tags: Value = serde_json::from_str(fields["tags"].as_str().unwrap()).unwrap();
        assert_eq!(tags, json!(["a", "b"]));
        let exif: Value = serde_json::from_str(fields["exif"].as_str().unwrap()).unwrap();
        assert_eq!(exif, json!({"w": 10, "nested": {"h": [1, 2]}}));
    }

    #[test]
    fn test_upload_request_defaults_filename() {
        let req = requests().upload_bytes(b"hello".to_vec(), &UploadOptions::new());
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.url, "https://media.example.io/v1/f/upload");
        match req.body {
            Body::Multipart(form) => {
                assert_eq!(form.file.name, "file");
                assert_eq!(form.file.filename, DEFAULT_FILENAME);
                assert_eq!(form.file.bytes, b"hello");
                assert!(form.fields.is_empty());
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[test]
    fn test_upload_url_request() {
        let parent = Uuid::new_v4();
        let req = requests()
            .upload_url(
                "https://cdn.example.com/a.png",
                &UploadOptions::new()
                    .parent_id(parent)
                    .meta("tags", json!(["x"]))
                    .meta("skip", Value::Null),
            )
            .unwrap();
        assert_eq!(req.url, "https://media.example.io/v1/f/url");
        assert_eq!(
            req.body,
            Body::Json(json!({
                "url": "https://cdn.example.com/a.png",
                "parent_id": parent.to_string(),
                "tags": ["x"],
            }))
        );
    }

    #[test]
    fn test_upload_url_rejects_non_http() {
        for url in ["ftp://host/a.png", "/tmp/a.png", "httpx://a", ""] {
            assert!(matches!(
                requests().upload_url(url, &UploadOptions::new()),
                Err(UFilesError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_replace_request() {
        let uid = Uuid::new_v4();
        let req = requests().replace_bytes(
            uid,
            b"v2".to_vec(),
            true,
            &UploadOptions::new().overwrite(false).filename("a.txt"),
        );
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.url, format!("https://media.example.io/v1/f/{uid}"));
        assert_eq!(req.query_value("overwrite"), Some("true"));
        match req.body {
            Body::Multipart(form) => {
                assert_eq!(form.file.filename, "a.txt");
                assert!(!form.fields.iter().any(|(k, _)| k == "overwrite"));
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[test]
    fn test_list_page_request() {
        let parent = Uuid::new_v4();
        let options = ListOptions::new()
            .parent_id(parent)
            .page_size(50)
            .filter("content_type", "image/png");
        let req = requests().list_page(&options, 100);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "https://media.example.io/v1/f");
        assert_eq!(req.query_value("parent_id"), Some(parent.to_string().as_str()));
        assert_eq!(req.query_value("offset"), Some("100"));
        assert_eq!(req.query_value("limit"), Some("50"));
        assert_eq!(req.query_value("content_type"), Some("image/png"));

        let req = requests().list_page(&ListOptions::new(), 0);
        assert_eq!(req.query_value("parent_id"), None);
        assert_eq!(req.query_value("limit"), Some("20"));
    }

    #[test]
    fn test_pager_advances_by_returned_count() {
        let mut pager = Pager::new(true);
        let mut offsets = Vec::new();
        for returned in [20, 20, 7, 0] {
            offsets.push(pager.next_offset().unwrap());
            pager.advance(returned);
        }
        assert_eq!(offsets, vec![0, 20, 40, 47]);
        assert_eq!(pager.next_offset(), None);
    }

    #[test]
    fn test_pager_single_page() {
        let mut pager = Pager::new(false);
        assert_eq!(pager.next_offset(), Some(0));
        pager.advance(20);
        assert_eq!(pager.next_offset(), None);
    }

    #[test]
    fn test_remote_errors_carry_status_and_body() {
        match decode_page(HttpResponse::new(500, "boom")) {
            Err(UFilesError::RemoteError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_page_without_items_is_empty() {
        assert!(decode_page(HttpResponse::new(200, "{}")).unwrap().is_empty());
    }

    #[test]
    fn test_deletion_passthrough() {
        let value = decode_deletion(HttpResponse::new(200, r#"{"deleted": true}"#)).unwrap();
        assert_eq!(value, json!({"deleted": true}));
        assert_eq!(decode_deletion(HttpResponse::new(204, "")).unwrap(), Value::Null);
    }

    #[test]
    fn test_replace_rejects_url_source() {
        assert!(matches!(
            url_replace_unsupported("https://a/b"),
            UFilesError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_file_hash_known_digests() {
        assert_eq!(file_hash(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(file_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_file_hash_path_matches_bytes() {
        use std::io::Write;

        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&content).unwrap();
        assert_eq!(file_hash_path(tmp.path()).unwrap(), file_hash(&content));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.bin");
        assert!(matches!(
            file_hash_path(&missing),
            Err(UFilesError::NotFound(p)) if p == missing
        ));
    }
}
