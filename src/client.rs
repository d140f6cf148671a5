// Blocking file client. Every method is one (or, for listings, a few)
// request/response round trips through the shared `Session`; the request
// shapes themselves come from `requests.rs`.

use crate::config::Config;
use crate::error::Result;
use crate::http::Transport;
use crate::requests::{
    decode_deletion, decode_item, decode_page, read_error, url_replace_unsupported,
    FileRequests, ListOptions, Pager, Source, UploadOptions,
};
use crate::schemas::FileItem;
use crate::session::Session;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Blocking client for the storage service.
pub struct UFiles<T: Transport = reqwest::blocking::Client> {
    session: Arc<Session<T>>,
    requests: FileRequests,
}

impl UFiles {
    /// Create a client configured from the environment (see [`Config::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env())
    }

    /// Create a client with its own session over a reqwest blocking client.
    pub fn new(config: &Config) -> Result<Self> {
        let session = Session::new(config.identity()?)?;
        Ok(Self::with_session(&config.ufiles_base_url, Arc::new(session)))
    }
}

impl<T: Transport> UFiles<T> {
    pub fn with_transport(config: &Config, transport: T) -> Result<Self> {
        let session = Session::with_transport(config.identity()?, transport);
        Ok(Self::with_session(&config.ufiles_base_url, Arc::new(session)))
    }

    /// Reuse an existing (possibly already authenticated) session.
    pub fn with_session(ufiles_base_url: &str, session: Arc<Session<T>>) -> Self {
        UFiles {
            session,
            requests: FileRequests::new(ufiles_base_url),
        }
    }

    pub fn session(&self) -> &Arc<Session<T>> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        self.requests.base_url()
    }

    /// Upload from any [`Source`].
    pub fn upload(&self, source: Source, options: &UploadOptions) -> Result<FileItem> {
        match source {
            Source::Path(path) => self.upload_file(path, options),
            Source::Bytes(bytes) => self.upload_bytes(bytes, options),
            Source::Url(url) => self.upload_url(&url, options),
        }
    }

    /// Read `path` and upload its bytes. Fails with `NotFound` before any
    /// request when the file does not exist.
    pub fn upload_file(&self, path: impl AsRef<Path>, options: &UploadOptions) -> Result<FileItem> {
        let bytes = read_local(path.as_ref())?;
        self.upload_bytes(bytes, options)
    }

    #[instrument(level = "debug", skip(self, bytes, options), fields(len = bytes.len()), err(Debug))]
    pub fn upload_bytes(&self, bytes: Vec<u8>, options: &UploadOptions) -> Result<FileItem> {
        let response = self.session.send(self.requests.upload_bytes(bytes, options))?;
        decode_item(response)
    }

    /// Ask the service to fetch `url` itself.
    #[instrument(level = "debug", skip(self, options), err(Debug))]
    pub fn upload_url(&self, url: &str, options: &UploadOptions) -> Result<FileItem> {
        let request = self.requests.upload_url(url, options)?;
        decode_item(self.session.send(request)?)
    }

    /// Replace the content of `uid`. `overwrite` is forwarded to the service,
    /// which decides between superseding and appending a version.
    pub fn replace(
        &self,
        uid: Uuid,
        source: Source,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        match source {
            Source::Path(path) => self.replace_file(uid, path, overwrite, options),
            Source::Bytes(bytes) => self.replace_bytes(uid, bytes, overwrite, options),
            Source::Url(url) => Err(url_replace_unsupported(&url)),
        }
    }

    pub fn replace_file(
        &self,
        uid: Uuid,
        path: impl AsRef<Path>,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        let bytes = read_local(path.as_ref())?;
        self.replace_bytes(uid, bytes, overwrite, options)
    }

    #[instrument(level = "debug", skip(self, bytes, options), err(Debug))]
    pub fn replace_bytes(
        &self,
        uid: Uuid,
        bytes: Vec<u8>,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        let request = self.requests.replace_bytes(uid, bytes, overwrite, options);
        decode_item(self.session.send(request)?)
    }

    /// List files, following pages until an empty one unless
    /// `options.all_pages` is false.
    #[instrument(level = "debug", skip(self), err(Debug))]
    pub fn list_files(&self, options: &ListOptions) -> Result<Vec<FileItem>> {
        let mut items = Vec::new();
        let mut pager = Pager::new(options.all_pages);
        while let Some(offset) = pager.next_offset() {
            let page = decode_page(self.session.send(self.requests.list_page(options, offset))?)?;
            debug!(offset, returned = page.len(), "fetched page");
            pager.advance(page.len());
            items.extend(page);
        }
        Ok(items)
    }

    /// Delete `uid` and return the service's deletion result untouched.
    #[instrument(level = "debug", skip(self), err(Debug))]
    pub fn delete_file(&self, uid: Uuid) -> Result<Value> {
        decode_deletion(self.session.send(self.requests.delete(uid))?)
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| read_error(path.to_path_buf(), e))
}
