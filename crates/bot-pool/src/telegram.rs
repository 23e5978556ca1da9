//! Telegram Bot API account.
//!
//! Async HTTP client using `reqwest`. Chunks are sent as documents with
//! `sendDocument`, resolved with `getFile` and downloaded from the file
//! endpoint.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::account::{BlobFuture, BotAccount, SentBlob};
use crate::error::BackendError;

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

/// A validated Telegram bot.
pub struct TelegramBot {
    http: reqwest::Client,
    token: String,
    username: String,
    base_url: String,
}

impl fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramBot")
            .field("username", &self.username)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramBot {
    /// Validates `token` with `getMe` and returns the connected bot.
    pub async fn connect(
        token: &str,
        http: reqwest::Client,
        base_url: &str,
    ) -> Result<Self, BackendError> {
        let mut bot = Self {
            http,
            token: token.trim().to_string(),
            username: String::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        let me: User = bot.call(bot.http.get(bot.method_url("getMe"))).await?;
        bot.username = me
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BackendError::Protocol("getMe returned no username".into()))?;

        Ok(bot)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token, file_path)
    }

    /// Sends a Bot API request and unwraps the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let parsed: ApiResponse<T> = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(BackendError::Api {
                    status: status.as_u16(),
                    description: String::from_utf8_lossy(&body).into_owned(),
                });
            }
        };

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| BackendError::Protocol("response has no result".into()));
        }

        let code = parsed.error_code.unwrap_or(status.as_u16());
        let description = parsed.description.unwrap_or_default();
        if code == 429 {
            return Err(BackendError::Throttled {
                retry_after: parsed
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
                description,
            });
        }

        Err(BackendError::Api {
            status: code,
            description,
        })
    }

    async fn send_document(
        &self,
        destination: i64,
        name: &str,
        data: Bytes,
        caption: &str,
    ) -> Result<SentBlob, BackendError> {
        let len = data.len() as u64;
        let part = Part::stream_with_length(data, len)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("chat_id", destination.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let msg: Message = self
            .call(self.http.post(self.method_url("sendDocument")).multipart(form))
            .await?;
        let document = msg
            .document
            .ok_or_else(|| BackendError::Protocol("sent message has no document".into()))?;

        Ok(SentBlob {
            message_id: msg.message_id,
            blob_id: document.file_id,
        })
    }

    async fn get_file_link(&self, blob_id: &str) -> Result<String, BackendError> {
        let file: File = self
            .call(
                self.http
                    .get(self.method_url("getFile"))
                    .query(&[("file_id", blob_id)]),
            )
            .await?;
        let path = file
            .file_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackendError::Protocol("getFile returned no file_path".into()))?;
        Ok(self.file_url(&path))
    }

    async fn download(&self, url: &str) -> Result<Bytes, BackendError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                description: "download failed".into(),
            });
        }
        Ok(resp.bytes().await?)
    }
}

impl BotAccount for TelegramBot {
    fn identity(&self) -> &str {
        &self.username
    }

    fn send_blob<'a>(
        &'a self,
        destination: i64,
        name: &'a str,
        data: Bytes,
        caption: &'a str,
    ) -> BlobFuture<'a, SentBlob> {
        Box::pin(self.send_document(destination, name, data, caption))
    }

    fn resolve_download_link<'a>(&'a self, blob_id: &'a str) -> BlobFuture<'a, String> {
        Box::pin(self.get_file_link(blob_id))
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BlobFuture<'a, Bytes> {
        Box::pin(self.download(url))
    }
}
