// Library root
// -----------
// Client for the uFiles storage service: upload (file, bytes or remote
// URL), paginated listing, content replacement and deletion, all behind a
// bearer-token session obtained from the identity service.
//
// Module responsibilities:
// - `config`: base URLs and credentials, from the environment or explicit.
// - `auth`: identity-service contract (token request/response, URL
//   derivation, token state).
// - `session`: blocking and async sessions that attach the token and
//   refresh-and-retry once on 401.
// - `requests`: pure request construction and response decoding shared by
//   both clients.
// - `client` / `async_client`: the blocking `UFiles` and async `AsyncUFiles`.
// - `http`: request/response values and the transport seams.
// - `schemas`: `FileItem` and permissions.
//
// Sessions are plain values: build one, wrap it in an `Arc` and hand it to
// every client that should share its token.
//
//     let files = UFiles::new(&Config::from_env())?;
//     let item = files.upload_file("cat.png", &UploadOptions::new().filename("cat.png"))?;
//     let siblings = files.list_files(&ListOptions::new().page_size(50))?;
pub mod async_client;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod requests;
pub mod schemas;
pub mod session;

pub use async_client::AsyncUFiles;
pub use auth::{Credentials, IdentityConfig};
pub use client::UFiles;
pub use config::Config;
pub use error::{Result, UFilesError};
pub use http::{AsyncTransport, HttpRequest, HttpResponse, Transport};
pub use requests::{file_hash, file_hash_path, ListOptions, Source, UploadOptions};
pub use schemas::{FileItem, PermissionGrant, PermissionLevel, UserPermission};
pub use session::{AsyncSession, Session};
