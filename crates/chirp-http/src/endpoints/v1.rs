//! v1.1 endpoints.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use chirp_core::{AuthMode, Error, Id, InvalidInputError, RecordStream, Result, UserRef};

use crate::client::Client;
use crate::paging::{self, RecordsAt};
use crate::stream;
use crate::transport::ApiRequest;

/// Options for [`Client::search`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Only tweets newer than this id (exclusive).
    pub since_id: Option<Id>,
    /// Only tweets at or older than this id (inclusive).
    pub max_id: Option<Id>,
    pub lang: Option<String>,
    /// `mixed`, `recent` (default) or `popular`.
    pub result_type: Option<String>,
    /// `latitude,longitude,radius`.
    pub geocode: Option<String>,
    /// Stop after this many pages.
    pub max_pages: Option<usize>,
}

/// Options for [`Client::timeline`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineOptions {
    pub since_id: Option<Id>,
    pub max_id: Option<Id>,
    #[serde(default)]
    pub exclude_replies: bool,
    #[serde(default)]
    pub exclude_retweets: bool,
    pub max_pages: Option<usize>,
}

/// Filter predicates for [`Client::filter`]. At least one must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterParams {
    /// Comma-separated phrases.
    pub track: Option<String>,
    /// Comma-separated user ids.
    pub follow: Option<String>,
    /// Comma-separated bounding boxes.
    pub locations: Option<String>,
    pub lang: Option<String>,
}

const SEARCH_COUNT: u32 = 100;
const TIMELINE_COUNT: u32 = 200;
const IDS_COUNT: u32 = 5000;

impl Client {
    fn v1(&self, path: &str) -> String {
        self.config().api_url.endpoint(&format!("1.1/{path}"))
    }

    fn v1_stream(&self, path: &str) -> String {
        self.config().stream_url.endpoint(&format!("1.1/{path}"))
    }

    /// Search the last week of tweets, newest first.
    #[instrument(skip(self, options))]
    pub fn search(&self, query: &str, options: SearchOptions) -> Result<RecordStream> {
        if query.trim().is_empty() {
            return Err(InvalidInputError::Other {
                message: "search query is empty".to_string(),
            }
            .into());
        }
        let request = ApiRequest::get(self.v1("search/tweets.json"))
            .query("q", query)
            .query("count", SEARCH_COUNT)
            .query("include_ext_alt_text", "true")
            .query("tweet_mode", "extended")
            .query_opt("since_id", options.since_id)
            .query_opt("max_id", options.max_id)
            .query_opt("lang", options.lang)
            .query_opt("result_type", options.result_type)
            .query_opt("geocode", options.geocode);
        debug!("Searching");
        Ok(paging::max_id(
            self.clone(),
            request,
            RecordsAt::Key("statuses"),
            options.max_pages,
        ))
    }

    /// A user's timeline, newest first.
    #[instrument(skip(self, options), fields(user = %user))]
    pub fn timeline(&self, user: &UserRef, options: TimelineOptions) -> Result<RecordStream> {
        let (key, value) = user.v1_param();
        let request = ApiRequest::get(self.v1("statuses/user_timeline.json"))
            .query(key, value)
            .query("count", TIMELINE_COUNT)
            .query("include_ext_alt_text", "true")
            .query("tweet_mode", "extended")
            .query("exclude_replies", options.exclude_replies)
            .query("include_rts", !options.exclude_retweets)
            .query_opt("since_id", options.since_id)
            .query_opt("max_id", options.max_id);
        Ok(paging::max_id(
            self.clone(),
            request,
            RecordsAt::Root,
            options.max_pages,
        ))
    }

    /// Ids of a user's followers. A missing user yields nothing.
    #[instrument(skip(self), fields(user = %user))]
    pub fn follower_ids(&self, user: &UserRef) -> Result<RecordStream> {
        Ok(self.ids("followers/ids.json", user))
    }

    /// Ids of the accounts a user follows. A missing user yields nothing.
    #[instrument(skip(self), fields(user = %user))]
    pub fn friend_ids(&self, user: &UserRef) -> Result<RecordStream> {
        Ok(self.ids("friends/ids.json", user))
    }

    fn ids(&self, path: &str, user: &UserRef) -> RecordStream {
        let (key, value) = user.v1_param();
        let request = ApiRequest::get(self.v1(path))
            .query(key, value)
            .query("count", IDS_COUNT)
            .query("stringify_ids", "true");
        paging::cursor(self.clone(), request, "ids", true)
    }

    /// Members of a list. A missing list is an error.
    #[instrument(skip(self), fields(list = %list_id))]
    pub fn list_members(&self, list_id: &Id) -> Result<RecordStream> {
        let request = ApiRequest::get(self.v1("lists/members.json"))
            .query("list_id", list_id)
            .query("count", IDS_COUNT)
            .query("include_entities", "true");
        Ok(paging::cursor(self.clone(), request, "users", false))
    }

    /// Full tweets for a sequence of ids, 100 per request. Each batch is
    /// yielded in ascending id order; ids that no longer resolve are absent.
    #[instrument(skip(self, ids))]
    pub fn hydrate<I>(&self, ids: I) -> Result<RecordStream>
    where
        I: IntoIterator<Item = Id>,
        I::IntoIter: Send + 'static,
    {
        let url = self.v1("statuses/lookup.json");
        let ids = ids.into_iter().map(|id| id.to_string());
        Ok(paging::batched_records(
            self.clone(),
            ids,
            move |batch| {
                ApiRequest::post(url.clone())
                    .form("id", batch.join(","))
                    .form("include_ext_alt_text", "true")
                    .form("tweet_mode", "extended")
            },
            true,
            false,
        ))
    }

    /// User profiles by id or by screen name, 100 per request.
    ///
    /// All references must be of the same kind. A batch that matches no
    /// user yields nothing.
    #[instrument(skip(self, users))]
    pub fn user_lookup(&self, users: Vec<UserRef>) -> Result<RecordStream> {
        let by_name = match users.first() {
            Some(UserRef::Username(_)) => true,
            Some(UserRef::Id(_)) | None => false,
        };
        if users.iter().any(|u| matches!(u, UserRef::Username(_)) != by_name) {
            return Err(InvalidInputError::Other {
                message: "cannot mix user ids and screen names in one lookup".to_string(),
            }
            .into());
        }
        let key = if by_name { "screen_name" } else { "user_id" };
        let url = self.v1("users/lookup.json");
        let values: Vec<String> = users.iter().map(|u| u.v1_param().1).collect();
        Ok(paging::batched_records(
            self.clone(),
            values,
            move |batch| ApiRequest::post(url.clone()).form(key, batch.join(",")),
            false,
            true,
        ))
    }

    /// Tweets matching `params` in real time. User context only.
    #[instrument(skip(self, params, cancel))]
    pub fn filter(&self, params: FilterParams, cancel: CancellationToken) -> Result<RecordStream> {
        self.require(AuthMode::User, "filter")?;
        if params.track.is_none() && params.follow.is_none() && params.locations.is_none() {
            return Err(Error::InvalidInput(InvalidInputError::Other {
                message: "filter needs track, follow or locations".to_string(),
            }));
        }
        let mut request = ApiRequest::post(self.v1_stream("statuses/filter.json"));
        for (key, value) in [
            ("track", params.track),
            ("follow", params.follow),
            ("locations", params.locations),
            ("language", params.lang),
        ] {
            if let Some(value) = value {
                request = request.form(key, value);
            }
        }
        Ok(stream::lines(self.clone(), request, cancel))
    }

    /// A small random sample of all public tweets. User context only.
    #[instrument(skip(self, cancel))]
    pub fn sample(&self, cancel: CancellationToken) -> Result<RecordStream> {
        self.require(AuthMode::User, "sample")?;
        let request = ApiRequest::get(self.v1_stream("statuses/sample.json"))
            .query("tweet_mode", "extended");
        Ok(stream::lines(self.clone(), request, cancel))
    }
}
