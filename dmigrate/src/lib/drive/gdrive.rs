use std::sync::Arc;

use super::{id::Id, ApiResult, Page, RemoteFile};
use crate::oauth2::GetToken;

#[derive(Clone)]
pub struct GoogleDrive<A> {
    client: reqwest::Client,
    auth: Arc<A>,
    base_url: String,
    user_agent: String,
}

impl<A> GoogleDrive<A>
where
    A: GetToken,
{
    /// Connects to the Drive API and logs who we are acting as
    pub async fn new(auth: A, client: reqwest::Client) -> anyhow::Result<Self> {
        Self::with_base_url(auth, client, "https://www.googleapis.com/drive/v3").await
    }

    pub async fn with_base_url(
        auth: A,
        client: reqwest::Client,
        base_url: &str,
    ) -> anyhow::Result<Self> {
        let user_agent = format!("dmigrate/{}", env!("CARGO_PKG_VERSION"));
        let drive = Self {
            auth: Arc::new(auth),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
        };

        let about = drive.about_get().await?;

        log::info!(
            "Access granted to Drive of {}{}",
            about.user.display_name,
            about
                .user
                .email_address
                .as_ref()
                .map(|em| format!(" <{em}>"))
                .unwrap_or_default(),
        );
        if let (Some(usage), Some(limit)) = (about.storage_quota.usage, about.storage_quota.limit)
        {
            use byte_unit::{Byte, UnitType};
            if let (Some(usage), Some(limit)) = (Byte::from_i64(usage), Byte::from_i64(limit)) {
                let usage = usage.get_appropriate_unit(UnitType::Binary);
                let limit = limit.get_appropriate_unit(UnitType::Binary);
                log::info!("Usage {usage:#.2} / {limit:#.3}");
            }
        }

        Ok(drive)
    }
}

impl<A> super::GetFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn get_file(&self, id: &Id) -> ApiResult<Option<RemoteFile>> {
        log::trace!("getting file {id}");
        self.files_get(id).await
    }
}

impl<A> super::ListChildren for GoogleDrive<A>
where
    A: GetToken,
{
    async fn list_children(&self, folder_id: &Id, page_token: Option<&str>) -> ApiResult<Page> {
        log::trace!("listing children of {folder_id}");
        let q = format!("'{folder_id}' in parents and trashed = false");
        let list = self.files_list(&q, page_token).await?;
        Ok(Page {
            files: list.files,
            next_page_token: list.next_page_token,
        })
    }
}

impl<A> super::CreateFolder for GoogleDrive<A>
where
    A: GetToken,
{
    async fn create_folder(&self, parent_id: &Id, name: &str) -> ApiResult<RemoteFile> {
        log::info!("creating folder {name} in folder {parent_id}");
        let f = api::NewFile {
            name,
            mime_type: Some(super::FOLDER_MIMETYPE),
            parents: vec![parent_id.as_str()],
        };
        self.files_create(&f).await
    }
}

impl<A> super::MoveFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn move_file(&self, id: &Id, new_parent: &Id, old_parent: &Id) -> ApiResult<()> {
        log::info!("moving file {id} from folder {old_parent} to folder {new_parent}");
        self.files_update_parents(id, new_parent, old_parent).await?;
        Ok(())
    }
}

impl<A> super::CopyFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn copy_file(&self, id: &Id, dest_parent: &Id, name: &str) -> ApiResult<RemoteFile> {
        log::info!("copying file {id} to folder {dest_parent} as {name}");
        let f = api::NewFile {
            name,
            mime_type: None,
            parents: vec![dest_parent.as_str()],
        };
        self.files_copy(id, &f).await
    }
}

impl<A> super::Drive for GoogleDrive<A> where A: GetToken {}

mod api {
    use http::StatusCode;
    use serde::{Deserialize, Serialize};

    use super::utils::{check_response, num_from_str};
    use crate::{
        drive::{id::Id, ApiError, ApiResult, RemoteFile},
        oauth2::GetToken,
    };

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub display_name: String,
        pub email_address: Option<String>,
    }

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Quota {
        #[serde(default, deserialize_with = "num_from_str")]
        pub limit: Option<i64>,
        #[serde(default, deserialize_with = "num_from_str")]
        pub usage: Option<i64>,
    }

    const ABOUT_FIELDS: &str = "kind,storageQuota,user";

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct About {
        kind: String,
        #[serde(default)]
        pub storage_quota: Quota,
        pub user: User,
    }

    const FILE_FIELDS: &str = "id,name,mimeType,parents,webViewLink";

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FileList {
        #[serde(default)]
        pub files: Vec<RemoteFile>,
        pub next_page_token: Option<String>,
    }

    #[derive(Clone, Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct NewFile<'a> {
        pub name: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub mime_type: Option<&'a str>,
        pub parents: Vec<&'a str>,
    }

    const SCOPE_FULL: &str = "https://www.googleapis.com/auth/drive";

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        pub async fn about_get(&self) -> ApiResult<About> {
            let path = "/about";
            let query_params = [("fields", ABOUT_FIELDS)];

            let res = self
                .request(reqwest::Method::GET, SCOPE_FULL, path, &query_params)
                .await?
                .send()
                .await?;
            let res = check_response("GET", path, res).await?;
            let about: About = res.json().await?;
            if about.kind != "drive#about" {
                return Err(ApiError::Decode("/about returned wrong kind!".into()));
            }
            Ok(about)
        }

        pub async fn files_get(&self, file_id: &Id) -> ApiResult<Option<RemoteFile>> {
            let path = format!("/files/{file_id}");
            let query_params = [("fields", FILE_FIELDS), ("supportsAllDrives", "true")];

            let res = self
                .request(reqwest::Method::GET, SCOPE_FULL, &path, &query_params)
                .await?
                .send()
                .await?;
            if res.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let res = check_response("GET", &path, res).await?;
            Ok(Some(res.json().await?))
        }

        pub async fn files_list(&self, q: &str, page_token: Option<&str>) -> ApiResult<FileList> {
            let path = "/files";
            let fields = format!("nextPageToken,files({FILE_FIELDS})");

            let mut query_params = vec![
                ("q", q),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(page_token) = page_token {
                query_params.push(("pageToken", page_token));
            }

            let res = self
                .request(reqwest::Method::GET, SCOPE_FULL, path, &query_params)
                .await?
                .send()
                .await?;
            let res = check_response("GET", path, res).await?;
            Ok(res.json().await?)
        }

        pub async fn files_create(&self, file: &NewFile<'_>) -> ApiResult<RemoteFile> {
            let path = "/files";
            let query_params = [("fields", FILE_FIELDS), ("supportsAllDrives", "true")];
            let res = self
                .request(reqwest::Method::POST, SCOPE_FULL, path, &query_params)
                .await?
                .json(file)
                .send()
                .await?;
            let res = check_response("POST", path, res).await?;
            Ok(res.json().await?)
        }

        pub async fn files_update_parents(
            &self,
            file_id: &Id,
            add: &Id,
            remove: &Id,
        ) -> ApiResult<RemoteFile> {
            let path = format!("/files/{file_id}");
            let query_params = [
                ("addParents", add.as_str()),
                ("removeParents", remove.as_str()),
                ("fields", FILE_FIELDS),
                ("supportsAllDrives", "true"),
            ];
            let res = self
                .request(reqwest::Method::PATCH, SCOPE_FULL, &path, &query_params)
                .await?
                .json(&serde_json::json!({}))
                .send()
                .await?;
            let res = check_response("PATCH", &path, res).await?;
            Ok(res.json().await?)
        }

        pub async fn files_copy(&self, file_id: &Id, file: &NewFile<'_>) -> ApiResult<RemoteFile> {
            let path = format!("/files/{file_id}/copy");
            let query_params = [("fields", FILE_FIELDS), ("supportsAllDrives", "true")];
            let res = self
                .request(reqwest::Method::POST, SCOPE_FULL, &path, &query_params)
                .await?
                .json(file)
                .send()
                .await?;
            let res = check_response("POST", &path, res).await?;
            Ok(res.json().await?)
        }
    }
}

mod utils {
    use oauth2::Scope;
    use reqwest::{header, RequestBuilder, Response};
    use serde::{Deserialize, Deserializer};
    use url::Url;

    use crate::{
        drive::{ApiError, ApiResult},
        oauth2::GetToken,
    };

    pub fn num_from_str<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use std::str::FromStr;

        let s = String::deserialize(deserializer)?;
        Ok(Some(i64::from_str(&s).map_err(serde::de::Error::custom)?))
    }

    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Debug, Deserialize)]
    struct ErrorDetail {
        #[serde(default)]
        message: String,
        #[serde(default)]
        errors: Vec<ErrorItem>,
    }

    #[derive(Debug, Deserialize)]
    struct ErrorItem {
        reason: Option<String>,
    }

    /// Maps a Drive error body to an [`ApiError`]
    pub fn parse_error(status: u16, body: &str) -> ApiError {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error }) => {
                let reason = error.errors.into_iter().find_map(|e| e.reason);
                ApiError::Status {
                    status,
                    reason,
                    message: error.message,
                }
            }
            Err(_) => ApiError::Status {
                status,
                reason: None,
                message: body.to_string(),
            },
        }
    }

    pub async fn check_response(method: &str, path: &str, res: Response) -> ApiResult<Response> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await?;
            log::debug!("{method} {path} returned {status}\n{body}");
            return Err(parse_error(status.as_u16(), &body));
        }
        Ok(res)
    }

    impl From<reqwest::Error> for ApiError {
        fn from(value: reqwest::Error) -> Self {
            if value.is_decode() {
                ApiError::Decode(value.to_string())
            } else {
                ApiError::Transport(value.to_string())
            }
        }
    }

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        /// Prepares an authorized request.
        pub async fn request(
            &self,
            method: reqwest::Method,
            scope: &str,
            path: &str,
            query_params: &[(&str, &str)],
        ) -> ApiResult<RequestBuilder> {
            let token = self
                .auth
                .get_token(vec![Scope::new(scope.to_string())])
                .await
                .map_err(|err| ApiError::Auth(format!("{err:#}")))?;
            let url = Url::parse_with_params(&format!("{}{path}", self.base_url), query_params)
                .map_err(|err| ApiError::Transport(err.to_string()))?;

            Ok(self
                .client
                .request(method, url)
                .bearer_auth(token.secret())
                .header(header::USER_AGENT, &self.user_agent))
        }
    }

}
