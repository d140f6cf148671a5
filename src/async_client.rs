// Async file client. Mirrors `UFiles` method for method; only the await
// points differ. Suspension happens at the token fetch, at each request and
// at local file reads.

use crate::config::Config;
use crate::error::Result;
use crate::http::AsyncTransport;
use crate::requests::{
    decode_deletion, decode_item, decode_page, read_error, url_replace_unsupported,
    FileRequests, ListOptions, Pager, Source, UploadOptions,
};
use crate::schemas::FileItem;
use crate::session::AsyncSession;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Non-blocking client for the storage service.
pub struct AsyncUFiles<T: AsyncTransport = reqwest::Client> {
    session: Arc<AsyncSession<T>>,
    requests: FileRequests,
}

impl AsyncUFiles {
    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env())
    }

    pub fn new(config: &Config) -> Result<Self> {
        let session = AsyncSession::new(config.identity()?)?;
        Ok(Self::with_session(&config.ufiles_base_url, Arc::new(session)))
    }
}

impl<T: AsyncTransport> AsyncUFiles<T> {
    pub fn with_transport(config: &Config, transport: T) -> Result<Self> {
        let session = AsyncSession::with_transport(config.identity()?, transport);
        Ok(Self::with_session(&config.ufiles_base_url, Arc::new(session)))
    }

    pub fn with_session(ufiles_base_url: &str, session: Arc<AsyncSession<T>>) -> Self {
        AsyncUFiles {
            session,
            requests: FileRequests::new(ufiles_base_url),
        }
    }

    pub fn session(&self) -> &Arc<AsyncSession<T>> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        self.requests.base_url()
    }

    pub async fn upload(&self, source: Source, options: &UploadOptions) -> Result<FileItem> {
        match source {
            Source::Path(path) => self.upload_file(path, options).await,
            Source::Bytes(bytes) => self.upload_bytes(bytes, options).await,
            Source::Url(url) => self.upload_url(&url, options).await,
        }
    }

    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        let bytes = read_local(path.as_ref()).await?;
        self.upload_bytes(bytes, options).await
    }

    #[instrument(level = "debug", skip(self, bytes, options), fields(len = bytes.len()), err(Debug))]
    pub async fn upload_bytes(&self, bytes: Vec<u8>, options: &UploadOptions) -> Result<FileItem> {
        let request = self.requests.upload_bytes(bytes, options);
        decode_item(self.session.send(request).await?)
    }

    #[instrument(level = "debug", skip(self, options), err(Debug))]
    pub async fn upload_url(&self, url: &str, options: &UploadOptions) -> Result<FileItem> {
        let request = self.requests.upload_url(url, options)?;
        decode_item(self.session.send(request).await?)
    }

    pub async fn replace(
        &self,
        uid: Uuid,
        source: Source,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        match source {
            Source::Path(path) => self.replace_file(uid, path, overwrite, options).await,
            Source::Bytes(bytes) => self.replace_bytes(uid, bytes, overwrite, options).await,
            Source::Url(url) => Err(url_replace_unsupported(&url)),
        }
    }

    pub async fn replace_file(
        &self,
        uid: Uuid,
        path: impl AsRef<Path>,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        let bytes = read_local(path.as_ref()).await?;
        self.replace_bytes(uid, bytes, overwrite, options).await
    }

    #[instrument(level = "debug", skip(self, bytes, options), err(Debug))]
    pub async fn replace_bytes(
        &self,
        uid: Uuid,
        bytes: Vec<u8>,
        overwrite: bool,
        options: &UploadOptions,
    ) -> Result<FileItem> {
        let request = self.requests.replace_bytes(uid, bytes, overwrite, options);
        decode_item(self.session.send(request).await?)
    }

    #[instrument(level = "debug", skip(self), err(Debug))]
    pub async fn list_files(&self, options: &ListOptions) -> Result<Vec<FileItem>> {
        let mut items = Vec::new();
        let mut pager = Pager::new(options.all_pages);
        while let Some(offset) = pager.next_offset() {
            let request = self.requests.list_page(options, offset);
            let page = decode_page(self.session.send(request).await?)?;
            debug!(offset, returned = page.len(), "fetched page");
            pager.advance(page.len());
            items.extend(page);
        }
        Ok(items)
    }

    #[instrument(level = "debug", skip(self), err(Debug))]
    pub async fn delete_file(&self, uid: Uuid) -> Result<Value> {
        decode_deletion(self.session.send(self.requests.delete(uid)).await?)
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| read_error(path.to_path_buf(), e))
}
