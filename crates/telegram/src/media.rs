//! Relayed media: file ids resolved through `getFile` and streamed from the
//! Bot API file endpoint, and the profile photo cache behind `photo_url`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use {
    axum::{
        Router,
        body::Body,
        extract::{Path, State},
        http::{HeaderValue, StatusCode, header},
        response::{IntoResponse, Response},
        routing::get,
    },
    teloxide::{
        RequestError,
        prelude::*,
        types::{PhotoSize, UserId as TgUserId},
    },
    tracing::{debug, warn},
};

/// The Bot API refuses downloads of files this large.
const FILE_SIZE_LIMIT: u32 = 20 * 1024 * 1024;

/// Download paths are valid for an hour.
const FILE_PATH_TTL: Duration = Duration::from_secs(50 * 60);

/// Minimum time between profile photo lookups for one user.
const PHOTO_REFRESH: Duration = Duration::from_secs(30 * 60);

/// Upstream error bodies are cut to this many bytes.
const ERROR_BODY_LIMIT: usize = 512;

pub(crate) fn media_url(base: &str, file_id: &str) -> String {
    format!("{}/{file_id}", base.trim_end_matches('/'))
}

/// The largest photo size the bot may download, falling back to the first.
pub fn biggest_photo(sizes: &[PhotoSize]) -> Option<String> {
    sizes
        .iter()
        .filter(|ps| ps.file.size < FILE_SIZE_LIMIT)
        .max_by_key(|ps| u64::from(ps.width) * u64::from(ps.height))
        .or_else(|| sizes.first())
        .map(|ps| ps.file.id.to_string())
}

struct PhotoEntry {
    file_id: Option<String>,
    checked: Instant,
}

/// Profile photo file ids by user, refreshed at most every 30 minutes.
#[derive(Default)]
pub struct ProfilePhotos {
    users: Mutex<HashMap<TgUserId, PhotoEntry>>,
}

impl ProfilePhotos {
    fn lock(&self) -> MutexGuard<'_, HashMap<TgUserId, PhotoEntry>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn file_id(&self, user: TgUserId) -> Option<String> {
        self.lock().get(&user).and_then(|e| e.file_id.clone())
    }

    /// Mark `user` as checked now, returning whether a lookup is due.
    pub fn claim_refresh(&self, user: TgUserId) -> bool {
        let now = Instant::now();
        let mut users = self.lock();
        match users.get_mut(&user) {
            Some(entry) if now.duration_since(entry.checked) < PHOTO_REFRESH => false,
            Some(entry) => {
                entry.checked = now;
                true
            },
            None => {
                users.insert(user, PhotoEntry {
                    file_id: None,
                    checked: now,
                });
                true
            },
        }
    }

    pub fn store(&self, user: TgUserId, file_id: Option<String>) {
        let mut users = self.lock();
        let entry = users.entry(user).or_insert_with(|| PhotoEntry {
            file_id: None,
            checked: Instant::now(),
        });
        entry.file_id = file_id;
    }
}

/// Look up `user`'s current profile photo and cache it.
pub(crate) async fn refresh_photo(bot: Bot, photos: Arc<ProfilePhotos>, user: TgUserId) {
    match bot.get_user_profile_photos(user).limit(1).await {
        Ok(found) => {
            let file_id = found.photos.first().map(Vec::as_slice).and_then(biggest_photo);
            debug!(user_id = user.0, has_photo = file_id.is_some(), "refreshed profile photo");
            photos.store(user, file_id);
        },
        Err(e) => warn!(user_id = user.0, error = %e, "failed to get profile photo"),
    }
}

struct CachedPath {
    path: String,
    expires: Instant,
}

/// HTTP handler serving `GET /{file_id}` with the file's contents.
///
/// The bot token only appears in the upstream request, never in the links
/// handed out or in responses.
#[derive(Clone)]
pub struct MediaProxy {
    bot: Bot,
    paths: Arc<Mutex<HashMap<String, CachedPath>>>,
}

impl MediaProxy {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            paths: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/{file_id}", get(serve_file))
            .with_state(self)
    }

    fn paths(&self) -> MutexGuard<'_, HashMap<String, CachedPath>> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn file_path(&self, file_id: &str) -> Result<String, RequestError> {
        let cached = self
            .paths()
            .get(file_id)
            .filter(|c| c.expires > Instant::now())
            .map(|c| c.path.clone());
        if let Some(path) = cached {
            return Ok(path);
        }

        let file = self.bot.get_file(file_id).await?;
        self.paths().insert(file_id.to_string(), CachedPath {
            path: file.path.clone(),
            expires: Instant::now() + FILE_PATH_TTL,
        });
        Ok(file.path)
    }
}

async fn serve_file(State(proxy): State<MediaProxy>, Path(file_id): Path<String>) -> Response {
    let path = match proxy.file_path(&file_id).await {
        Ok(path) if !path.is_empty() => path,
        Ok(_) => {
            return (StatusCode::BAD_REQUEST, "Telegram file path missing").into_response();
        },
        Err(e) => {
            warn!(file_id = %file_id, error = %e, "telegram getFile failed");
            return (StatusCode::BAD_REQUEST, "Telegram getFile failed").into_response();
        },
    };

    let url = match proxy
        .bot
        .api_url()
        .join(&format!("file/bot{}/{path}", proxy.bot.token()))
    {
        Ok(url) => url,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let upstream = match proxy.bot.client().get(url).send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(file_id = %file_id, error = %e.without_url(), "telegram file download failed");
            return (StatusCode::BAD_GATEWAY, "Telegram file download failed").into_response();
        },
    };

    let status = upstream.status().as_u16();
    if status >= 300 {
        let body = upstream
            .bytes()
            .await
            .map(|b| b.slice(..b.len().min(ERROR_BODY_LIMIT)))
            .unwrap_or_default();
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        return (code, body).into_response();
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE.as_str())
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}
