//! v2 endpoints.
//!
//! Every tweet and user request asks for the full field and expansion sets,
//! so pages come back with everything the flattener can use.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use chirp_core::{AuthMode, Error, Id, InvalidInputError, PageStream, Result, UserRef};

use crate::client::Client;
use crate::paging;
use crate::stream;
use crate::transport::ApiRequest;

pub const TWEET_FIELDS: &str = "attachments,author_id,context_annotations,conversation_id,created_at,edit_controls,edit_history_tweet_ids,entities,geo,id,in_reply_to_user_id,lang,note_tweet,possibly_sensitive,public_metrics,referenced_tweets,reply_settings,source,text,withheld";

pub const USER_FIELDS: &str = "created_at,description,entities,id,location,name,pinned_tweet_id,profile_image_url,protected,public_metrics,url,username,verified,verified_type,withheld";

pub const MEDIA_FIELDS: &str = "alt_text,duration_ms,height,media_key,preview_image_url,public_metrics,type,url,variants,width";

pub const POLL_FIELDS: &str = "duration_minutes,end_datetime,id,options,voting_status";

pub const PLACE_FIELDS: &str = "contained_within,country,country_code,full_name,geo,id,name,place_type";

pub const TWEET_EXPANSIONS: &str = "attachments.media_keys,attachments.poll_ids,author_id,edit_history_tweet_ids,entities.mentions.username,geo.place_id,in_reply_to_user_id,referenced_tweets.id,referenced_tweets.id.author_id";

pub const USER_EXPANSIONS: &str = "pinned_tweet_id";

/// Token parameter for search endpoints.
const SEARCH_TOKEN: &str = "next_token";
/// Token parameter for everything else.
const PAGINATION_TOKEN: &str = "pagination_token";

/// Parameters shared by search and timeline requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    pub since_id: Option<Id>,
    pub until_id: Option<Id>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Results per page.
    pub max_results: Option<u32>,
    /// Stop after this many pages.
    pub max_pages: Option<usize>,
}

impl SearchParams {
    fn apply(&self, request: ApiRequest) -> ApiRequest {
        request
            .query_opt("since_id", self.since_id.as_ref())
            .query_opt("until_id", self.until_id.as_ref())
            .query_opt("start_time", self.start_time.map(timestamp))
            .query_opt("end_time", self.end_time.map(timestamp))
            .query_opt("max_results", self.max_results)
    }
}

/// Extra parameters for user timelines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineParams {
    #[serde(flatten)]
    pub search: SearchParams,
    #[serde(default)]
    pub exclude_replies: bool,
    #[serde(default)]
    pub exclude_retweets: bool,
}

/// Bucket size for tweet counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    #[default]
    Hour,
    Day,
}

impl Granularity {
    fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

/// A filtered stream rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRule {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl StreamRule {
    pub fn new(value: impl Into<String>, tag: Option<&str>) -> Self {
        Self {
            value: value.into(),
            tag: tag.map(str::to_string),
        }
    }
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn with_tweet_fields(request: ApiRequest) -> ApiRequest {
    request
        .query("expansions", TWEET_EXPANSIONS)
        .query("tweet.fields", TWEET_FIELDS)
        .query("user.fields", USER_FIELDS)
        .query("media.fields", MEDIA_FIELDS)
        .query("poll.fields", POLL_FIELDS)
        .query("place.fields", PLACE_FIELDS)
}

fn with_user_fields(request: ApiRequest) -> ApiRequest {
    request
        .query("expansions", USER_EXPANSIONS)
        .query("user.fields", USER_FIELDS)
        .query("tweet.fields", TWEET_FIELDS)
}

impl Client {
    fn v2(&self, path: &str) -> String {
        self.config().api_url.endpoint(&format!("2/{path}"))
    }

    /// Search the last week.
    #[instrument(skip(self, params))]
    pub fn search_recent(&self, query: &str, params: SearchParams) -> Result<PageStream> {
        self.search_v2("tweets/search/recent", query, params)
    }

    /// Search the full archive. App context only.
    #[instrument(skip(self, params))]
    pub fn search_all(&self, query: &str, params: SearchParams) -> Result<PageStream> {
        self.require(AuthMode::App, "search_all")?;
        self.search_v2("tweets/search/all", query, params)
    }

    fn search_v2(&self, path: &str, query: &str, params: SearchParams) -> Result<PageStream> {
        if query.trim().is_empty() {
            return Err(InvalidInputError::Other {
                message: "search query is empty".to_string(),
            }
            .into());
        }
        let request = with_tweet_fields(ApiRequest::get(self.v2(path)).query("query", query));
        let request = params.apply(request);
        Ok(paging::token(
            self.clone(),
            request,
            SEARCH_TOKEN,
            params.max_pages,
        ))
    }

    /// Tweet counts for a query over the last week.
    #[instrument(skip(self))]
    pub fn counts_recent(&self, query: &str, granularity: Granularity) -> Result<PageStream> {
        let request = ApiRequest::get(self.v2("tweets/counts/recent"))
            .query("query", query)
            .query("granularity", granularity.as_str());
        Ok(paging::token(self.clone(), request, SEARCH_TOKEN, None))
    }

    /// Tweets by id, 100 per request, one page per batch.
    #[instrument(skip(self, ids))]
    pub fn tweet_lookup<I>(&self, ids: I) -> Result<PageStream>
    where
        I: IntoIterator<Item = Id>,
        I::IntoIter: Send + 'static,
    {
        let url = self.v2("tweets");
        let ids = ids.into_iter().map(|id| id.to_string());
        Ok(paging::batched_pages(self.clone(), ids, move |batch| {
            with_tweet_fields(ApiRequest::get(url.clone()).query("ids", batch.join(",")))
        }))
    }

    /// Users by id or by username, 100 per request, one page per batch.
    #[instrument(skip(self, users))]
    pub fn user_lookup_v2<I>(&self, users: I, by_username: bool) -> Result<PageStream>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let (url, key) = if by_username {
            (self.v2("users/by"), "usernames")
        } else {
            (self.v2("users"), "ids")
        };
        let users = users
            .into_iter()
            .map(|u| u.trim().trim_start_matches('@').to_string());
        Ok(paging::batched_pages(self.clone(), users, move |batch| {
            with_user_fields(ApiRequest::get(url.clone()).query(key, batch.join(",")))
        }))
    }

    /// Resolve a user reference to a numeric id.
    ///
    /// Ids are returned as they are; usernames cost one lookup request.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn user_id(&self, user: &UserRef) -> Result<Id> {
        let name = match user {
            UserRef::Id(id) => return Ok(id.clone()),
            UserRef::Username(name) => name,
        };
        let request = ApiRequest::get(self.v2("users/by")).query("usernames", name);
        let page = self.get_json(&request).await?;
        let id = page
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|user| user.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| InvalidInputError::Username {
                value: name.clone(),
                reason: "no such user".to_string(),
            })?;
        debug!(username = %name, id, "Resolved username");
        Id::new(id)
    }

    /// Page through a per-user endpoint, resolving the user first.
    fn user_pages(
        &self,
        user: &UserRef,
        build: impl FnOnce(&Client, &Id) -> ApiRequest + Send + 'static,
        max_pages: Option<usize>,
    ) -> PageStream {
        let client = self.clone();
        let user = user.clone();
        paging::chain_after(move || async move {
            let id = client.user_id(&user).await?;
            let request = build(&client, &id);
            Ok::<_, Error>(paging::token(client, request, PAGINATION_TOKEN, max_pages))
        })
    }

    /// A user's tweets, newest first.
    #[instrument(skip(self, params), fields(user = %user))]
    pub fn timeline_v2(&self, user: &UserRef, params: TimelineParams) -> Result<PageStream> {
        let max_pages = params.search.max_pages;
        Ok(self.user_pages(
            user,
            move |client, id| {
                let mut exclude = Vec::new();
                if params.exclude_replies {
                    exclude.push("replies");
                }
                if params.exclude_retweets {
                    exclude.push("retweets");
                }
                let request = with_tweet_fields(ApiRequest::get(client.v2(&format!("users/{id}/tweets"))));
                let request = params.search.apply(request);
                if exclude.is_empty() {
                    request
                } else {
                    request.query("exclude", exclude.join(","))
                }
            },
            max_pages,
        ))
    }

    /// Tweets mentioning a user, newest first.
    #[instrument(skip(self, params), fields(user = %user))]
    pub fn mentions(&self, user: &UserRef, params: SearchParams) -> Result<PageStream> {
        let max_pages = params.max_pages;
        Ok(self.user_pages(
            user,
            move |client, id| {
                params.apply(with_tweet_fields(ApiRequest::get(
                    client.v2(&format!("users/{id}/mentions")),
                )))
            },
            max_pages,
        ))
    }

    /// A user's followers.
    #[instrument(skip(self), fields(user = %user))]
    pub fn followers(&self, user: &UserRef) -> Result<PageStream> {
        Ok(self.follows(user, "followers"))
    }

    /// The accounts a user follows.
    #[instrument(skip(self), fields(user = %user))]
    pub fn following(&self, user: &UserRef) -> Result<PageStream> {
        Ok(self.follows(user, "following"))
    }

    fn follows(&self, user: &UserRef, edge: &'static str) -> PageStream {
        self.user_pages(
            user,
            move |client, id| {
                with_user_fields(ApiRequest::get(client.v2(&format!("users/{id}/{edge}"))))
                    .query("max_results", 1000)
            },
            None,
        )
    }

    /// Tweets a user has liked.
    #[instrument(skip(self), fields(user = %user))]
    pub fn liked_tweets(&self, user: &UserRef) -> Result<PageStream> {
        Ok(self.user_pages(
            user,
            |client, id| {
                with_tweet_fields(ApiRequest::get(client.v2(&format!("users/{id}/liked_tweets"))))
                    .query("max_results", 100)
            },
            None,
        ))
    }

    /// Users who liked a tweet.
    #[instrument(skip(self), fields(tweet = %tweet_id))]
    pub fn liking_users(&self, tweet_id: &Id) -> Result<PageStream> {
        let request = with_user_fields(ApiRequest::get(
            self.v2(&format!("tweets/{tweet_id}/liking_users")),
        ))
        .query("max_results", 100);
        Ok(paging::token(self.clone(), request, PAGINATION_TOKEN, None))
    }

    /// Users who retweeted a tweet.
    #[instrument(skip(self), fields(tweet = %tweet_id))]
    pub fn retweeted_by(&self, tweet_id: &Id) -> Result<PageStream> {
        let request = with_user_fields(ApiRequest::get(
            self.v2(&format!("tweets/{tweet_id}/retweeted_by")),
        ))
        .query("max_results", 100);
        Ok(paging::token(self.clone(), request, PAGINATION_TOKEN, None))
    }

    /// Tweets quoting a tweet.
    #[instrument(skip(self), fields(tweet = %tweet_id))]
    pub fn quote_tweets(&self, tweet_id: &Id) -> Result<PageStream> {
        let request = with_tweet_fields(ApiRequest::get(
            self.v2(&format!("tweets/{tweet_id}/quote_tweets")),
        ))
        .query("max_results", 100);
        Ok(paging::token(self.clone(), request, PAGINATION_TOKEN, None))
    }

    /// Members of a list.
    #[instrument(skip(self), fields(list = %list_id))]
    pub fn list_members_v2(&self, list_id: &Id) -> Result<PageStream> {
        let request = with_user_fields(ApiRequest::get(
            self.v2(&format!("lists/{list_id}/members")),
        ))
        .query("max_results", 100);
        Ok(paging::token(self.clone(), request, PAGINATION_TOKEN, None))
    }

    /// A 1% sample of all tweets as they are posted. App context only.
    #[instrument(skip(self, cancel))]
    pub fn sample_stream(&self, cancel: CancellationToken) -> Result<PageStream> {
        self.require(AuthMode::App, "sample_stream")?;
        let request = with_tweet_fields(ApiRequest::get(self.v2("tweets/sample/stream")));
        Ok(stream::lines(self.clone(), request, cancel))
    }

    /// Tweets matching the registered stream rules. App context only.
    #[instrument(skip(self, cancel))]
    pub fn search_stream(&self, cancel: CancellationToken) -> Result<PageStream> {
        self.require(AuthMode::App, "search_stream")?;
        let request = with_tweet_fields(ApiRequest::get(self.v2("tweets/search/stream")));
        Ok(stream::lines(self.clone(), request, cancel))
    }

    /// The registered stream rules.
    #[instrument(skip(self))]
    pub async fn get_stream_rules(&self) -> Result<Value> {
        self.require(AuthMode::App, "get_stream_rules")?;
        self.get_json(&ApiRequest::get(self.v2("tweets/search/stream/rules")))
            .await
    }

    /// Register stream rules.
    #[instrument(skip(self))]
    pub async fn add_stream_rules(&self, rules: &[StreamRule]) -> Result<Value> {
        self.require(AuthMode::App, "add_stream_rules")?;
        info!(count = rules.len(), "Adding stream rules");
        let request = ApiRequest::post(self.v2("tweets/search/stream/rules"))
            .json(json!({ "add": rules }));
        self.get_json(&request).await
    }

    /// Delete stream rules by id.
    #[instrument(skip(self))]
    pub async fn delete_stream_rules(&self, ids: &[Id]) -> Result<Value> {
        self.require(AuthMode::App, "delete_stream_rules")?;
        info!(count = ids.len(), "Deleting stream rules");
        let request = ApiRequest::post(self.v2("tweets/search/stream/rules"))
            .json(json!({ "delete": { "ids": ids } }));
        self.get_json(&request).await
    }
}
