use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::AccountResolver;
use crate::account::{AccountId, AccountRecord};
use crate::config::ApiConfig;
use crate::error::{Result, TagspreadError};

/// Largest page the id and list-member endpoints accept
const MAX_PAGE_SIZE: usize = 5000;

/// Profile fields we read from `users/show` and `lists/members`
#[derive(Deserialize)]
struct UserProfile {
    id_str: String,
    screen_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    followers_count: u64,
}

/// One page of a cursored id listing
#[derive(Deserialize)]
struct IdPage {
    ids: Vec<u64>,
    next_cursor: i64,
}

/// One page of list members
#[derive(Deserialize)]
struct MemberPage {
    users: Vec<UserProfile>,
    next_cursor: i64,
}

enum UserKey<'a> {
    Id(&'a AccountId),
    Handle(&'a str),
}

impl UserKey<'_> {
    fn query(&self) -> (&'static str, String) {
        match self {
            UserKey::Id(id) => ("user_id", id.to_string()),
            UserKey::Handle(handle) => ("screen_name", handle.trim_start_matches('@').to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            UserKey::Id(id) => format!("id {}", id),
            UserKey::Handle(handle) => format!("handle @{}", handle.trim_start_matches('@')),
        }
    }
}

/// Social platform REST client
///
/// Reads profiles, cursor-paginated follower/friend id lists and list
/// members. Rate-limit (429) and server (5xx) responses are retried with
/// exponential backoff; once retries run out they surface as
/// [`TagspreadError::TransientFetch`].
pub struct HttpResolver {
    client: Client,
    base_url: String,
    bearer_token: String,
    page_size: usize,
    max_retries: usize,
    backoff: Duration,
}

impl HttpResolver {
    /// Create a client from the `[api]` config section
    pub fn new(api: &ApiConfig, bearer_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| TagspreadError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            bearer_token,
            page_size: api.page_size.clamp(1, MAX_PAGE_SIZE),
            max_retries: api.max_retries,
            backoff: Duration::from_secs(api.rate_limit_backoff_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        retry_transient(self.max_retries, self.backoff, path, || {
            self.get_json_once(path, query, what)
        })
        .await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, what, &body));
        }

        response
            .json()
            .await
            .map_err(|e| TagspreadError::Api(format!("Failed to parse response for {}: {}", what, e)))
    }

    async fn fetch_profile(&self, key: &UserKey<'_>) -> Result<UserProfile> {
        self.get_json("users/show.json", &[key.query()], &key.describe())
            .await
    }

    /// Walk every page of `followers/ids` or `friends/ids`
    async fn fetch_ids(&self, kind: &str, key: &UserKey<'_>) -> Result<Vec<AccountId>> {
        let path = format!("{}/ids.json", kind);
        let path = path.as_str();
        let what = key.describe();
        let what = what.as_str();

        let ids: Vec<AccountId> = walk_cursor(|cursor| async move {
            let page: IdPage = self
                .get_json(
                    path,
                    &[
                        key.query(),
                        ("cursor", cursor.to_string()),
                        ("count", self.page_size.to_string()),
                    ],
                    what,
                )
                .await?;
            let ids = page.ids.into_iter().map(AccountId::from).collect::<Vec<_>>();
            Ok::<_, TagspreadError>((ids, page.next_cursor))
        })
        .await?;

        log::debug!("Fetched {} {} ids for {}", ids.len(), kind, key.describe());
        Ok(ids)
    }

    async fn fetch_record(&self, key: UserKey<'_>) -> Result<AccountRecord> {
        let profile = self.fetch_profile(&key).await?;
        let by_id = AccountId::new(profile.id_str.clone());
        let id_key = UserKey::Id(&by_id);
        let friends = self.fetch_ids("friends", &id_key).await?;
        let followers = self.fetch_ids("followers", &id_key).await?;

        Ok(record_from_profile(profile, friends, followers))
    }
}

fn record_from_profile(
    profile: UserProfile,
    friends: Vec<AccountId>,
    followers: Vec<AccountId>,
) -> AccountRecord {
    AccountRecord {
        id: AccountId::new(profile.id_str),
        handle: profile.screen_name,
        description: profile.description.unwrap_or_default(),
        friends,
        followers,
        tags: Default::default(),
    }
}

/// Run `attempt` until it succeeds or fails for good.
///
/// Transient errors are retried up to `max_retries` times, sleeping
/// `backoff` before the first retry and doubling it each time. The last
/// transient error is returned once retries run out.
async fn retry_transient<T, F, Fut>(
    max_retries: usize,
    backoff: Duration,
    label: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    let mut delay = backoff;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retries < max_retries => {
                log::warn!(
                    "Retry {}/{} for {} in {:?} after error: {}",
                    retries + 1,
                    max_retries,
                    label,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Collect every page of a cursored listing.
///
/// `fetch_page` gets the cursor to request (`-1` for the first page) and
/// returns the page's items with the next cursor; `0` marks the last page.
async fn walk_cursor<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, i64)>>,
{
    let mut items = Vec::new();
    let mut cursor: i64 = -1;

    loop {
        let (page, next_cursor) = fetch_page(cursor).await?;
        items.extend(page);
        if next_cursor == 0 {
            return Ok(items);
        }
        cursor = next_cursor;
    }
}

/// Classify a failed send: timeouts and connection failures are worth
/// retrying, anything else (bad URL, builder or redirect errors) is not.
fn send_error(e: reqwest::Error) -> TagspreadError {
    if e.is_timeout() || e.is_connect() {
        TagspreadError::TransientFetch(format!("Network error: {}", e))
    } else {
        TagspreadError::Api(format!("Network error: {}", e))
    }
}

/// Map a non-success status to the error taxonomy
fn status_error(status: StatusCode, what: &str, body: &str) -> TagspreadError {
    match status {
        StatusCode::NOT_FOUND => TagspreadError::AccountNotFound(what.to_string()),
        // Suspended or protected accounts
        StatusCode::FORBIDDEN => {
            TagspreadError::AccountNotFound(format!("{} is not accessible", what))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            TagspreadError::TransientFetch(format!("Rate limited while fetching {}", what))
        }
        s if s.is_server_error() => {
            TagspreadError::TransientFetch(format!("API error {} for {}: {}", s, what, body))
        }
        s => TagspreadError::Api(format!("API error {} for {}: {}", s, what, body)),
    }
}

#[async_trait]
impl AccountResolver for HttpResolver {
    async fn resolve(&self, id: &AccountId) -> Result<AccountRecord> {
        self.fetch_record(UserKey::Id(id)).await
    }

    async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord> {
        self.fetch_record(UserKey::Handle(handle)).await
    }

    async fn follower_count(&self, handle: &str) -> Result<u64> {
        let profile = self.fetch_profile(&UserKey::Handle(handle)).await?;
        Ok(profile.followers_count)
    }

    async fn list_members(&self, owner: &str, slug: &str) -> Result<Vec<AccountRecord>> {
        let what = format!("list {}/{}", owner, slug);
        let what_ref = what.as_str();

        let profiles: Vec<UserProfile> = walk_cursor(|cursor| async move {
            let page: MemberPage = self
                .get_json(
                    "lists/members.json",
                    &[
                        ("owner_screen_name", owner.trim_start_matches('@').to_string()),
                        ("slug", slug.to_string()),
                        ("cursor", cursor.to_string()),
                        ("count", self.page_size.to_string()),
                    ],
                    what_ref,
                )
                .await?;
            Ok::<_, TagspreadError>((page.users, page.next_cursor))
        })
        .await?;

        log::info!("{} has {} members", what, profiles.len());

        let mut records = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let id = AccountId::new(profile.id_str.clone());
            let key = UserKey::Id(&id);
            let friends = self.fetch_ids("friends", &key).await?;
            let followers = self.fetch_ids("followers", &key).await?;
            records.push(record_from_profile(profile, friends, followers));
        }

        Ok(records)
    }
}

/// Extract `(owner, slug)` from a list URL such as
/// `https://twitter.com/nytfood/lists/chefs`.
pub fn parse_list_url(list_url: &str) -> Result<(String, String)> {
    let invalid = || TagspreadError::InvalidInput(format!("not a list URL: {}", list_url));

    let parsed = url::Url::parse(list_url).map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?;
    let known_host = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));
    if !(known_host("twitter.com") || known_host("x.com")) {
        return Err(invalid());
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [owner, "lists", slug, ..] => Ok((owner.to_string(), slug.to_string())),
        _ => Err(invalid()),
    }
}
