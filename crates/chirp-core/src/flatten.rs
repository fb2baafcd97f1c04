//! Response flattening.
//!
//! v2 responses side-load referenced objects into a page-level `includes`
//! container. Flattening copies those objects back onto the records that
//! reference them and drops `includes`, so every output record stands on its
//! own.
//!
//! Expansion is additive: keys already present on a record are never changed,
//! and merges only add keys the target lacks. Running the expansion twice
//! therefore gives the same result as running it once.
//!
//! # Example
//!
//! ```
//! use chirp_core::flatten::{flatten, Flattenable};
//! use serde_json::json;
//!
//! let page = json!({
//!     "data": [{"id": "1", "text": "hi", "author_id": "9"}],
//!     "includes": {"users": [{"id": "9", "username": "jack"}]}
//! });
//! let records = flatten(Flattenable::classify(page).unwrap());
//! assert_eq!(records[0]["author"]["username"], "jack");
//! ```

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::InvalidInputError;
use crate::page::{METADATA_KEY, page_records};

/// Page-level keys copied onto every record of the page.
const PROPAGATED_KEYS: [&str; 2] = ["matching_rules", METADATA_KEY];

/// The shapes the flattener accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Flattenable {
    /// A single record that has already been flattened (no `data` key).
    OneRecord(Value),
    /// A list of already-flattened records.
    RecordList(Vec<Value>),
    /// A single v2 page (an object with a `data` key).
    OnePage(Value),
    /// A list of v2 pages.
    PageList(Vec<Value>),
}

impl Flattenable {
    /// Detect the shape of an arbitrary JSON value.
    ///
    /// Objects with a `data` key are pages, other objects are records. Lists
    /// must hold only pages or only records; nested lists, scalars and mixed
    /// lists are rejected. An empty list is an empty record list.
    pub fn classify(value: Value) -> Result<Self, InvalidInputError> {
        match value {
            Value::Object(object) if object.contains_key("data") => {
                Ok(Self::OnePage(Value::Object(object)))
            }
            Value::Object(object) => Ok(Self::OneRecord(Value::Object(object))),
            Value::Array(items) => {
                let mut pages = 0;
                for item in &items {
                    match item {
                        Value::Object(object) if object.contains_key("data") => pages += 1,
                        Value::Object(_) => {}
                        other => {
                            return Err(InvalidInputError::Shape {
                                found: format!("a list containing {}", kind(other)),
                            });
                        }
                    }
                }
                if pages == 0 {
                    Ok(Self::RecordList(items))
                } else if pages == items.len() {
                    Ok(Self::PageList(items))
                } else {
                    Err(InvalidInputError::Shape {
                        found: "a list mixing pages and records".to_string(),
                    })
                }
            }
            other => Err(InvalidInputError::Shape {
                found: kind(&other).to_string(),
            }),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a nested list",
        Value::Object(_) => "an object",
    }
}

/// Flatten any accepted shape into a list of self-contained records.
pub fn flatten(input: Flattenable) -> Vec<Value> {
    match input {
        Flattenable::OneRecord(record) => vec![record],
        Flattenable::RecordList(records) => records,
        Flattenable::OnePage(page) => flatten_page(&page),
        Flattenable::PageList(pages) => pages.iter().flat_map(flatten_page).collect(),
    }
}

/// Flatten a single v2 page. A page without `includes` still expands, with
/// every reference resolving to an empty object.
pub fn flatten_page(page: &Value) -> Vec<Value> {
    let includes = Includes::from_page(page);
    let propagated: Vec<(&str, &Value)> = PROPAGATED_KEYS
        .iter()
        .filter_map(|key| page.get(*key).map(|value| (*key, value)))
        .collect();

    page_records(page)
        .into_iter()
        .map(|mut record| {
            includes.expand(&mut record, &includes.tweets);
            if let Some(object) = record.as_object_mut() {
                for (key, value) in &propagated {
                    insert_absent(object, key, (*value).clone());
                }
            }
            record
        })
        .collect()
}

/// Lookup tables built from a page's `includes`.
#[derive(Debug, Default)]
struct Includes {
    users: HashMap<String, Value>,
    users_by_username: HashMap<String, Value>,
    media: HashMap<String, Value>,
    polls: HashMap<String, Value>,
    places: HashMap<String, Value>,
    /// Included tweets, already expanded one level.
    tweets: HashMap<String, Value>,
}

impl Includes {
    fn from_page(page: &Value) -> Self {
        let Some(includes) = page.get("includes") else {
            return Self::default();
        };
        let list = |name: &str| -> Vec<Value> {
            includes
                .get(name)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        let users = list("users");
        let mut tables = Self {
            users: index_by(&users, "id"),
            users_by_username: index_by(&users, "username"),
            media: index_by(&list("media"), "media_key"),
            polls: index_by(&list("polls"), "id"),
            places: index_by(&list("places"), "id"),
            tweets: HashMap::new(),
        };

        // One level only: included tweets reference each other unexpanded.
        let raw_tweets = list("tweets");
        let raw_index = index_by(&raw_tweets, "id");
        for mut tweet in raw_tweets {
            tables.expand(&mut tweet, &raw_index);
            if let Some(id) = key_of(&tweet, "id") {
                tables.tweets.insert(id, tweet);
            }
        }
        tables
    }

    /// Expand one record in place against these tables, resolving
    /// referenced tweets through `tweets`.
    fn expand(&self, record: &mut Value, tweets: &HashMap<String, Value>) {
        let Some(object) = record.as_object_mut() else {
            return;
        };

        if let Some(id) = key_of_map(object, "author_id") {
            insert_absent(object, "author", lookup(&self.users, &id));
        }
        if let Some(id) = key_of_map(object, "in_reply_to_user_id") {
            insert_absent(object, "in_reply_to_user", lookup(&self.users, &id));
        }
        if let Some(id) = key_of_map(object, "pinned_tweet_id") {
            insert_absent(object, "pinned_tweet", lookup(tweets, &id));
        }

        if let Some(attachments) = object.get_mut("attachments").and_then(Value::as_object_mut) {
            if let Some(keys) = attachments.get("media_keys").and_then(Value::as_array) {
                let media: Vec<Value> = keys
                    .iter()
                    .map(|key| match id_string(key) {
                        Some(key) => lookup(&self.media, &key),
                        None => empty(),
                    })
                    .collect();
                insert_absent(attachments, "media", Value::Array(media));
            }
            let poll_id = attachments
                .get("poll_ids")
                .and_then(Value::as_array)
                .and_then(|ids| ids.first())
                .and_then(id_string);
            if let Some(poll_id) = poll_id {
                insert_absent(attachments, "poll", lookup(&self.polls, &poll_id));
            }
        }

        if !self.places.is_empty()
            && let Some(geo) = object.get_mut("geo").and_then(Value::as_object_mut)
            && let Some(place_id) = key_of_map(geo, "place_id")
        {
            insert_absent(geo, "place", lookup(&self.places, &place_id));
        }

        if let Some(mentions) = object
            .get_mut("entities")
            .and_then(|entities| entities.get_mut("mentions"))
            .and_then(Value::as_array_mut)
        {
            for mention in mentions.iter_mut().filter_map(Value::as_object_mut) {
                if let Some(username) = key_of_map(mention, "username")
                    && let Some(user) = self.users_by_username.get(&username)
                {
                    merge_absent(mention, user);
                }
            }
        }

        if let Some(references) = object
            .get_mut("referenced_tweets")
            .and_then(Value::as_array_mut)
        {
            for reference in references.iter_mut().filter_map(Value::as_object_mut) {
                if let Some(id) = key_of_map(reference, "id")
                    && let Some(tweet) = tweets.get(&id)
                {
                    merge_absent(reference, tweet);
                }
            }
        }
    }
}

/// The empty-object sentinel for a dangling reference.
fn empty() -> Value {
    Value::Object(Map::new())
}

fn lookup(table: &HashMap<String, Value>, key: &str) -> Value {
    table.get(key).cloned().unwrap_or_else(empty)
}

fn index_by(items: &[Value], key: &str) -> HashMap<String, Value> {
    items
        .iter()
        .filter_map(|item| key_of(item, key).map(|k| (k, item.clone())))
        .collect()
}

/// Ids arrive as strings in v2 but tolerate numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn key_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(id_string)
}

fn key_of_map(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(id_string)
}

fn insert_absent(object: &mut Map<String, Value>, key: &str, value: Value) {
    if !object.contains_key(key) {
        object.insert(key.to_string(), value);
    }
}

/// Copy the keys of `source` that `target` lacks.
fn merge_absent(target: &mut Map<String, Value>, source: &Value) {
    let Some(source) = source.as_object() else {
        return;
    };
    for (key, value) in source {
        if !target.contains_key(key) {
            target.insert(key.clone(), value.clone());
        }
    }
}
