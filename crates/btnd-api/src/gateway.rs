//! The remote gateway: JSON-RPC transport with durable token accounting.

use btnd_model::{CatalogTorrent, SearchPage, SnatchPage, UserInfo};
use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket, even_fill, now_unix};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::decode;
use crate::error::{ApiError, ApiResult, CODE_CALL_LIMIT_EXCEEDED};
use crate::urls::SiteUrls;

/// Page size used when a caller wants the remote to return everything
/// it will give from an offset.
pub const UNBOUNDED_RESULTS: i64 = 1 << 31;

/// Optional site credentials. Which ones are required depends on the
/// operation: RPC calls need only the key; downloads need `authkey` and
/// `passkey`; the feed additionally needs `auth`.
#[derive(Debug, Clone, Default)]
pub struct SiteCredentials {
    /// Session credential for the feed URL.
    pub auth: Option<String>,
    /// Tracker credential for download URLs.
    pub authkey: Option<String>,
    /// Tracker credential for download and announce URLs.
    pub passkey: Option<String>,
}

/// Token-accounting knobs for one RPC.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// Tokens to leave in the bucket after this call.
    pub leave_tokens: i64,
    /// Block until a token is available instead of failing fast.
    pub block_on_token: bool,
    /// Whether this call consumes a token at all (callers that reserved
    /// one up front pass `false`).
    pub consume_token: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            leave_tokens: 0,
            block_on_token: true,
            consume_token: true,
        }
    }
}

impl CallOptions {
    /// Options for a caller that already reserved its token.
    #[must_use]
    pub const fn reserved() -> Self {
        Self {
            leave_tokens: 0,
            block_on_token: false,
            consume_token: false,
        }
    }
}

/// Gateway over the remote's JSON-RPC API and plain HTTP surfaces.
///
/// Every RPC draws from the durable API bucket and every plain fetch
/// from the generic bucket, so all workers and processes stay inside
/// the shared budgets.
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    key: String,
    credentials: SiteCredentials,
    urls: SiteUrls,
    api_bucket: ScheduledTokenBucket,
    web_bucket: TokenBucket,
}

impl Gateway {
    /// Build a gateway over the given buckets and endpoints.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the HTTP client cannot be built.
    pub fn new(
        key: impl Into<String>,
        credentials: SiteCredentials,
        urls: SiteUrls,
        api_bucket: ScheduledTokenBucket,
        web_bucket: TokenBucket,
    ) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| ApiError::Transport {
                operation: "build http client",
                source,
            })?;
        Ok(Self {
            http,
            key: key.into(),
            credentials,
            urls,
            api_bucket,
            web_bucket,
        })
    }

    /// The site URL set this gateway talks to.
    #[must_use]
    pub const fn urls(&self) -> &SiteUrls {
        &self.urls
    }

    /// The durable API bucket, shared with the scrapers for peeking and
    /// up-front reservation.
    #[must_use]
    pub const fn api_bucket(&self) -> &ScheduledTokenBucket {
        &self.api_bucket
    }

    /// Perform one JSON-RPC call and return its `result` payload.
    ///
    /// A remote call-limit error rewrites the API bucket to the remote's
    /// view of the window before surfacing, so subsequent callers wait
    /// precisely as long as the remote demands.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::WouldBlock`] when `block_on_token` is off and
    /// the bucket is empty, and the taxonomy errors otherwise.
    pub async fn call(
        &self,
        method: &str,
        user_params: Vec<Value>,
        options: CallOptions,
    ) -> ApiResult<Value> {
        if options.consume_token {
            if options.block_on_token {
                self.api_bucket.consume(1, options.leave_tokens).await?;
            } else {
                let grant = self.api_bucket.try_consume(1, options.leave_tokens).await?;
                if !grant.granted {
                    return Err(ApiError::WouldBlock);
                }
            }
        }

        let mut params = vec![Value::String(self.key.clone())];
        params.extend(user_params);
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let call_time = now_unix();
        let response = self
            .http
            .post(self.urls.api_endpoint().clone())
            .json(&envelope)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                operation: "rpc post",
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport {
                operation: "rpc body",
                source,
            })?;
        debug!(method, response = %truncate_for_log(&body), "rpc round trip");

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| ApiError::Parse {
            detail: format!("response is not json: {err}"),
        })?;
        if let Some(error) = payload.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if code == CODE_CALL_LIMIT_EXCEEDED {
                // The remote's window is authoritative: rewrite the queue
                // so waits line up with its sliding quota.
                self.api_bucket.set(0, call_time, even_fill).await?;
            }
            return Err(ApiError::Remote { message, code });
        }
        payload.get("result").cloned().ok_or_else(|| ApiError::Parse {
            detail: "response carries neither result nor error".to_string(),
        })
    }

    /// Fetch a plain HTTP resource, consuming one generic token.
    ///
    /// # Errors
    ///
    /// Returns a transport or HTTP error on failure.
    pub async fn get_url(&self, url: Url) -> ApiResult<Vec<u8>> {
        self.web_bucket.consume(1, 0).await?;
        debug!(%url, "http fetch");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                operation: "http get",
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Transport {
                operation: "http body",
                source,
            })?;
        Ok(bytes.to_vec())
    }

    /// `getTorrents`: one page of the catalog, decoded.
    ///
    /// # Errors
    ///
    /// Surfaces the taxonomy errors from [`Gateway::call`].
    pub async fn get_torrents(
        &self,
        filters: Value,
        results: i64,
        offset: i64,
        options: CallOptions,
    ) -> ApiResult<SearchPage> {
        let result = self
            .call(
                "getTorrents",
                vec![filters, json!(results), json!(offset)],
                options,
            )
            .await?;
        decode::search_page_from_json(&result)
    }

    /// Walk the whole catalog page by page.
    ///
    /// # Errors
    ///
    /// Surfaces the taxonomy errors from [`Gateway::call`].
    pub async fn get_torrents_paged(
        &self,
        filters: Value,
        options: CallOptions,
    ) -> ApiResult<Vec<CatalogTorrent>> {
        let mut offset = 0;
        let mut rows = Vec::new();
        loop {
            let page = self
                .get_torrents(filters.clone(), UNBOUNDED_RESULTS, offset, options)
                .await?;
            let page_len = i64::try_from(page.torrents.len()).unwrap_or(i64::MAX);
            rows.extend(page.torrents);
            if page_len == 0 || offset + page_len >= page.results {
                return Ok(rows);
            }
            offset += page_len;
        }
    }

    /// `getTorrentById`: one catalog row, decoded, or `None` when the
    /// remote does not know the id.
    ///
    /// # Errors
    ///
    /// Surfaces the taxonomy errors from [`Gateway::call`].
    pub async fn get_torrent_by_id(
        &self,
        id: i64,
        options: CallOptions,
    ) -> ApiResult<Option<CatalogTorrent>> {
        let result = self.call("getTorrentById", vec![json!(id)], options).await?;
        if result.is_null() {
            return Ok(None);
        }
        decode::torrent_from_json(&result).map(Some)
    }

    /// `getUserSnatchlist`: one page of the account's snatch history.
    ///
    /// # Errors
    ///
    /// Surfaces the taxonomy errors from [`Gateway::call`].
    pub async fn get_user_snatchlist(
        &self,
        results: i64,
        offset: i64,
        options: CallOptions,
    ) -> ApiResult<SnatchPage> {
        let result = self
            .call(
                "getUserSnatchlist",
                vec![json!(results), json!(offset)],
                options,
            )
            .await?;
        decode::snatch_page_from_json(&result)
    }

    /// `userInfo`: the account singleton.
    ///
    /// # Errors
    ///
    /// Surfaces the taxonomy errors from [`Gateway::call`].
    pub async fn user_info(&self, options: CallOptions) -> ApiResult<UserInfo> {
        let result = self.call("userInfo", Vec::new(), options).await?;
        decode::user_info_from_json(&result)
    }

    /// The authenticated download URL for a torrent id.
    ///
    /// # Errors
    ///
    /// Returns a credential error when `authkey` or `passkey` is unset.
    pub fn download_url(&self, id: i64) -> ApiResult<Url> {
        let authkey = self
            .credentials
            .authkey
            .as_deref()
            .ok_or(ApiError::MissingCredential { name: "authkey" })?;
        let passkey = self
            .credentials
            .passkey
            .as_deref()
            .ok_or(ApiError::MissingCredential { name: "passkey" })?;
        Ok(self.urls.download_url(authkey, passkey, id))
    }

    /// Fetch the raw metafile bytes for a torrent, consuming one
    /// generic token.
    ///
    /// # Errors
    ///
    /// Returns a credential error when download credentials are unset,
    /// and transport/HTTP errors from the fetch.
    pub async fn fetch_raw_torrent(&self, id: i64) -> ApiResult<Vec<u8>> {
        let url = self.download_url(id)?;
        self.get_url(url).await
    }

    /// Fetch the recent-uploads feed and mine the torrent ids out of it,
    /// consuming one generic token.
    ///
    /// # Errors
    ///
    /// Returns a credential error when feed credentials are unset, and
    /// transport/HTTP errors from the fetch.
    pub async fn feed_ids(&self, user: i64) -> ApiResult<Vec<i64>> {
        let auth = self
            .credentials
            .auth
            .as_deref()
            .ok_or(ApiError::MissingCredential { name: "auth" })?;
        let authkey = self
            .credentials
            .authkey
            .as_deref()
            .ok_or(ApiError::MissingCredential { name: "authkey" })?;
        let passkey = self
            .credentials
            .passkey
            .as_deref()
            .ok_or(ApiError::MissingCredential { name: "passkey" })?;
        let url = self.urls.feed_url(user, auth, passkey, authkey);
        let body = self.get_url(url).await?;
        Ok(decode::feed_ids_from_xml(&String::from_utf8_lossy(&body)))
    }
}

fn truncate_for_log(body: &str) -> String {
    if body.len() <= 100 {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(at, _)| *at < 97)
            .map(|(at, character)| at + character.len_utf8())
            .last()
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_log_verbatim() {
        assert_eq!(truncate_for_log("{\"ok\":1}"), "{\"ok\":1}");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let logged = truncate_for_log(&body);
        assert_eq!(logged.len(), 100);
        assert!(logged.ends_with("..."));
    }
}
