use std::{error, fmt};

use futures::Future;
use serde::{Deserialize, Serialize};

pub mod gdrive;
pub mod id;

use self::id::{Id, IdBuf};

pub const FOLDER_MIMETYPE: &str = "application/vnd.google-apps.folder";

/// A file or folder as reported by the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: IdBuf,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<IdBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIMETYPE
    }
}

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub files: Vec<RemoteFile>,
    pub next_page_token: Option<String>,
}

/// How a failed remote call should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limiting or unavailability, worth another attempt
    Transient,
    /// Ownership or permission forbids the operation
    PermissionDenied,
    /// Anything else
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The service answered with an error status
    Status {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    /// The request did not reach the service, or the answer was cut
    Transport(String),
    /// The answer could not be decoded
    Decode(String),
    /// No access token could be obtained
    Auth(String),
}

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl ApiError {
    pub fn status(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.map(ToOwned::to_owned),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Status { status, reason, .. } => match *status {
                429 | 500 | 502 | 503 | 504 => ErrorClass::Transient,
                403 if reason
                    .as_deref()
                    .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)) =>
                {
                    ErrorClass::Transient
                }
                403 => ErrorClass::PermissionDenied,
                _ => ErrorClass::Fatal,
            },
            Self::Transport(..) => ErrorClass::Transient,
            Self::Decode(..) | Self::Auth(..) => ErrorClass::Fatal,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                status,
                reason: Some(reason),
                message,
            } => write!(f, "{status} ({reason}): {message}"),
            Self::Status {
                status,
                reason: None,
                message,
            } => write!(f, "{status}: {message}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Decode(msg) => write!(f, "could not decode response: {msg}"),
            Self::Auth(msg) => write!(f, "could not get an access token: {msg}"),
        }
    }
}

impl error::Error for ApiError {}

impl From<ApiError> for dmig::Error {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::Auth(msg) => dmig::Error::Auth(msg),
            other => dmig::Error::Api(other.to_string()),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub trait GetFile {
    /// Fetches the metadata of `id`, or `None` if no such file exists
    fn get_file(&self, id: &Id) -> impl Future<Output = ApiResult<Option<RemoteFile>>> + Send;
}

pub trait ListChildren {
    /// Lists one page of the non-trashed children of `folder_id`
    fn list_children(
        &self,
        folder_id: &Id,
        page_token: Option<&str>,
    ) -> impl Future<Output = ApiResult<Page>> + Send;
}

pub trait CreateFolder {
    fn create_folder(
        &self,
        parent_id: &Id,
        name: &str,
    ) -> impl Future<Output = ApiResult<RemoteFile>> + Send;
}

pub trait MoveFile {
    /// Reparents `id` from `old_parent` to `new_parent`
    fn move_file(
        &self,
        id: &Id,
        new_parent: &Id,
        old_parent: &Id,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}

pub trait CopyFile {
    /// Copies the content of `id` into `dest_parent` as `name`
    fn copy_file(
        &self,
        id: &Id,
        dest_parent: &Id,
        name: &str,
    ) -> impl Future<Output = ApiResult<RemoteFile>> + Send;
}

/// The remote operations the migration engine relies on
pub trait Drive:
    GetFile + ListChildren + CreateFolder + MoveFile + CopyFile + Send + Sync + 'static
{
}
