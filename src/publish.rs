//! Posting artifacts to a Facebook page.
//!
//! Publishing is split in two so that nothing touches the network until the
//! request is known to be valid:
//!
//! 1. [`prepare_post`] checks credentials, the record, the media file and the
//!    schedule, producing a [`PreparedPost`].
//! 2. A [`Publisher`] sends it. [`GraphPublisher`] talks to the Graph API:
//!
//! ```text
//! GET  /{page_id}?fields=access_token      user token → page token
//! POST /{page_id}/photos | /videos         upload, published=false → media id
//! POST /{page_id}/feed                     message + attached_media[0]
//!                                          (+ scheduled_publish_time)
//! POST /{post_id}/comments                 optional first comment
//! ```
//!
//! Remote errors are surfaced verbatim and never retried.
//!
//! ## Schedules
//!
//! A schedule is a wall-clock time `"YYYY-MM-DD HH:MM"` read at a fixed UTC
//! offset (default +06:00). It must lie at least the configured lead time
//! (default 10 minutes) in the future.

use crate::catalog::Catalog;
use crate::config::{ConfigError, PublishConfig};
use crate::settings::Credentials;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// Extensions uploaded through the video endpoint.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

pub const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Facebook credentials not set; run `thumbforge credentials` first")]
    MissingCredentials,
    #[error("Thumbnail not found: {0}")]
    RecordNotFound(String),
    #[error("Media file not found: {}", .0.display())]
    MediaNotFound(PathBuf),
    #[error("Invalid schedule '{0}' (expected YYYY-MM-DD HH:MM)")]
    InvalidSchedule(String),
    #[error("Scheduled time must be at least {0} minutes in the future")]
    ScheduleTooSoon(i64),
    #[error("Facebook Auth Error: {0}")]
    Auth(String),
    #[error("Facebook API error: {0}")]
    Remote(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// When a post goes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Now,
    /// Wall-clock time at the configured offset.
    At(NaiveDateTime),
}

/// Parse `"now"` (or nothing) or a `"YYYY-MM-DD HH:MM"` wall-clock time.
pub fn parse_schedule(text: Option<&str>) -> Result<Schedule, PublishError> {
    let text = text.map(str::trim).unwrap_or("");
    if text.is_empty() || text.eq_ignore_ascii_case("now") {
        return Ok(Schedule::Now);
    }
    NaiveDateTime::parse_from_str(text, SCHEDULE_FORMAT)
        .map(Schedule::At)
        .map_err(|_| PublishError::InvalidSchedule(text.to_string()))
}

/// How schedules are interpreted and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRules {
    pub offset: FixedOffset,
    pub min_lead: chrono::Duration,
}

impl ScheduleRules {
    pub fn from_config(config: &PublishConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            offset: config.offset()?,
            min_lead: config.min_lead(),
        })
    }

    /// UTC instant for `schedule`, or `None` for an immediate post.
    pub fn resolve(
        &self,
        schedule: Schedule,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PublishError> {
        let Schedule::At(wall_clock) = schedule else {
            return Ok(None);
        };
        let at = self
            .offset
            .from_local_datetime(&wall_clock)
            .single()
            .ok_or_else(|| PublishError::InvalidSchedule(wall_clock.to_string()))?
            .with_timezone(&Utc);
        if at < now + self.min_lead {
            return Err(PublishError::ScheduleTooSoon(self.min_lead.num_minutes()));
        }
        Ok(Some(at))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Photo
        }
    }

    /// Graph API edge the media is uploaded to.
    pub fn endpoint(self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
        }
    }
}

/// What the user asked to post.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub record_id: String,
    pub caption: String,
    pub first_comment: Option<String>,
    pub schedule: Schedule,
    /// Post this file instead of the record's artifact.
    pub custom_media: Option<PathBuf>,
}

/// Everything the catalog and settings contribute to a publish.
pub struct PublishContext<'a> {
    pub credentials: &'a Credentials,
    pub catalog: &'a Catalog,
    pub generated_dir: &'a Path,
    pub rules: ScheduleRules,
    pub now: DateTime<Utc>,
}

/// A request that passed every local check.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPost {
    pub access_token: String,
    pub page_id: String,
    pub media: PathBuf,
    pub kind: MediaKind,
    pub caption: String,
    pub first_comment: Option<String>,
    /// `None` publishes immediately.
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostReceipt {
    pub post_id: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// The post went out but its first comment did not.
    pub comment_error: Option<String>,
}

/// Validate a request locally. Checks run in order: credentials, record,
/// media file, schedule.
pub fn prepare_post(
    request: &PostRequest,
    ctx: &PublishContext<'_>,
) -> Result<PreparedPost, PublishError> {
    let (token, page_id) = ctx
        .credentials
        .facebook()
        .ok_or(PublishError::MissingCredentials)?;

    let record = ctx
        .catalog
        .get(&request.record_id)
        .ok_or_else(|| PublishError::RecordNotFound(request.record_id.clone()))?;

    let media = match &request.custom_media {
        Some(path) => path.clone(),
        None => ctx.generated_dir.join(&record.filename),
    };
    if !media.is_file() {
        return Err(PublishError::MediaNotFound(media));
    }

    let publish_at = ctx.rules.resolve(request.schedule, ctx.now)?;

    Ok(PreparedPost {
        access_token: token.to_string(),
        page_id: page_id.to_string(),
        kind: MediaKind::from_path(&media),
        media,
        caption: request.caption.clone(),
        first_comment: request
            .first_comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from),
        publish_at,
    })
}

/// Sends a prepared post somewhere.
pub trait Publisher {
    fn publish(&self, post: &PreparedPost) -> Result<PostReceipt, PublishError>;
}

/// Check the request, then hand it to `publisher`.
pub fn publish_record<P: Publisher>(
    publisher: &P,
    request: &PostRequest,
    ctx: &PublishContext<'_>,
) -> Result<PostReceipt, PublishError> {
    let post = prepare_post(request, ctx)?;
    tracing::info!(
        record = %request.record_id,
        media = %post.media.display(),
        scheduled = post.publish_at.is_some(),
        "publishing"
    );
    publisher.publish(&post)
}

// =============================================================================
// Graph API client
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GraphResponse {
    id: Option<String>,
    access_token: Option<String>,
    error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: String,
}

impl GraphResponse {
    fn error_message(self, fallback: &str) -> String {
        self.error
            .map(|e| e.message)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Value of the `attached_media[0]` feed parameter.
fn attached_media(media_id: &str) -> String {
    serde_json::json!({ "media_fbid": media_id }).to_string()
}

/// Blocking Graph API publisher.
pub struct GraphPublisher {
    client: Client,
    base_url: String,
    version: String,
    video_timeout: Duration,
}

impl GraphPublisher {
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: GRAPH_BASE_URL.to_string(),
            version: config.graph_api_version.clone(),
            video_timeout: Duration::from_secs(config.video_timeout_secs),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.version, path)
    }

    fn read(response: reqwest::blocking::Response) -> Result<(bool, GraphResponse), PublishError> {
        let ok = response.status().is_success();
        let text = response.text()?;
        let body = serde_json::from_str(&text).unwrap_or_default();
        Ok((ok, body))
    }

    /// Exchange the stored user token for a page access token.
    fn page_token(&self, user_token: &str, page_id: &str) -> Result<String, PublishError> {
        let response = self
            .client
            .get(self.url(page_id))
            .query(&[("fields", "access_token"), ("access_token", user_token)])
            .send()?;
        match Self::read(response)? {
            (true, GraphResponse { access_token: Some(token), .. }) => Ok(token),
            (_, body) => Err(PublishError::Auth(
                body.error_message("Could not retrieve page access token"),
            )),
        }
    }

    fn upload(&self, post: &PreparedPost, page_token: &str) -> Result<String, PublishError> {
        let form = multipart::Form::new()
            .text("access_token", page_token.to_string())
            .text("published", "false")
            .file("source", &post.media)?;
        let mut request = self
            .client
            .post(self.url(&format!("{}/{}", post.page_id, post.kind.endpoint())))
            .multipart(form);
        if post.kind == MediaKind::Video {
            request = request.timeout(self.video_timeout);
        }
        match Self::read(request.send()?)? {
            (true, GraphResponse { id: Some(id), .. }) => Ok(id),
            (_, body) => Err(PublishError::Remote(
                body.error_message("Failed to upload media to Facebook."),
            )),
        }
    }

    fn create_post(
        &self,
        post: &PreparedPost,
        page_token: &str,
        media_id: &str,
    ) -> Result<String, PublishError> {
        let mut params = vec![
            ("access_token", page_token.to_string()),
            ("message", post.caption.clone()),
            ("attached_media[0]", attached_media(media_id)),
        ];
        if let Some(at) = post.publish_at {
            params.push(("scheduled_publish_time", at.timestamp().to_string()));
            params.push(("published", "false".to_string()));
        }
        let response = self
            .client
            .post(self.url(&format!("{}/feed", post.page_id)))
            .form(&params)
            .send()?;
        match Self::read(response)? {
            (true, GraphResponse { id: Some(id), .. }) => Ok(id),
            (_, body) => Err(PublishError::Remote(format!(
                "Failed to publish/schedule post: {}",
                body.error_message("Unknown Facebook API error.")
            ))),
        }
    }

    fn comment(&self, post_id: &str, page_token: &str, message: &str) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.url(&format!("{post_id}/comments")))
            .form(&[("access_token", page_token), ("message", message)])
            .send()?;
        match Self::read(response)? {
            (true, _) => Ok(()),
            (false, body) => Err(PublishError::Remote(
                body.error_message("Failed to post first comment."),
            )),
        }
    }
}

impl Publisher for GraphPublisher {
    fn publish(&self, post: &PreparedPost) -> Result<PostReceipt, PublishError> {
        let page_token = self.page_token(&post.access_token, &post.page_id)?;
        let media_id = self.upload(post, &page_token)?;
        tracing::debug!(%media_id, kind = ?post.kind, "media uploaded");
        let post_id = self.create_post(post, &page_token, &media_id)?;

        let comment_error = match &post.first_comment {
            Some(message) => match self.comment(&post_id, &page_token, message) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(%post_id, error = %e, "first comment failed");
                    Some(e.to_string())
                }
            },
            None => None,
        };

        Ok(PostReceipt {
            post_id,
            scheduled_for: post.publish_at,
            comment_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ArtifactRecord;
    use crate::rows::RowData;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    fn dhaka() -> ScheduleRules {
        ScheduleRules::from_config(&PublishConfig::default()).unwrap()
    }

    fn now() -> DateTime<Utc> {
        // 2026-03-01 12:00 at +06:00
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
    }

    fn at(text: &str) -> Schedule {
        parse_schedule(Some(text)).unwrap()
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: RefCell<Vec<PreparedPost>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, post: &PreparedPost) -> Result<PostReceipt, PublishError> {
            self.calls.borrow_mut().push(post.clone());
            Ok(PostReceipt {
                post_id: "123_456".into(),
                scheduled_for: post.publish_at,
                comment_error: None,
            })
        }
    }

    struct Fixture {
        tmp: TempDir,
        catalog: Catalog,
        credentials: Credentials,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            fs::write(tmp.path().join("a.png"), b"png").unwrap();
            let mut catalog = Catalog::default();
            catalog.upsert(ArtifactRecord {
                id: "rec".into(),
                filename: "a.png".into(),
                template: "basic.html".into(),
                data: RowData::new(),
                created_at: now(),
            });
            let credentials = Credentials {
                facebook_access_token: Some("user-token".into()),
                facebook_page_id: Some("42".into()),
            };
            Self {
                tmp,
                catalog,
                credentials,
            }
        }

        fn ctx(&self) -> PublishContext<'_> {
            PublishContext {
                credentials: &self.credentials,
                catalog: &self.catalog,
                generated_dir: self.tmp.path(),
                rules: dhaka(),
                now: now(),
            }
        }
    }

    fn request(schedule: Schedule) -> PostRequest {
        PostRequest {
            record_id: "rec".into(),
            caption: "Hello".into(),
            first_comment: Some("  ".into()),
            schedule,
            custom_media: None,
        }
    }

    // =========================================================================
    // Schedules
    // =========================================================================

    #[test]
    fn parse_schedule_now_and_time() {
        assert_eq!(parse_schedule(None).unwrap(), Schedule::Now);
        assert_eq!(parse_schedule(Some(" now ")).unwrap(), Schedule::Now);
        assert!(matches!(at("2026-03-01 14:30"), Schedule::At(_)));
    }

    #[test]
    fn parse_schedule_rejects_other_formats() {
        for bad in ["2026-03-01T14:30", "01/03/2026 14:30", "tomorrow", "2026-13-01 10:00"] {
            assert!(
                matches!(parse_schedule(Some(bad)), Err(PublishError::InvalidSchedule(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn schedule_is_read_at_configured_offset() {
        let resolved = dhaka().resolve(at("2026-03-01 14:00"), now()).unwrap();
        assert_eq!(resolved, Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()));
    }

    #[test]
    fn schedule_lead_time_boundary() {
        // exactly ten minutes ahead is accepted, one minute less is not
        assert!(dhaka().resolve(at("2026-03-01 12:10"), now()).is_ok());
        assert!(matches!(
            dhaka().resolve(at("2026-03-01 12:09"), now()),
            Err(PublishError::ScheduleTooSoon(10))
        ));
        assert!(dhaka().resolve(at("2026-03-01 11:00"), now()).is_err());
    }

    #[test]
    fn now_schedule_has_no_publish_time() {
        assert_eq!(dhaka().resolve(Schedule::Now, now()).unwrap(), None);
    }

    // =========================================================================
    // prepare_post
    // =========================================================================

    #[test]
    fn prepare_uses_record_artifact() {
        let fx = Fixture::new();
        let post = prepare_post(&request(Schedule::Now), &fx.ctx()).unwrap();
        assert_eq!(post.media, fx.tmp.path().join("a.png"));
        assert_eq!(post.kind, MediaKind::Photo);
        assert_eq!(post.access_token, "user-token");
        assert_eq!(post.page_id, "42");
        assert_eq!(post.first_comment, None);
        assert_eq!(post.publish_at, None);
    }

    #[test]
    fn prepare_requires_credentials() {
        let mut fx = Fixture::new();
        fx.credentials.facebook_page_id = None;
        assert!(matches!(
            prepare_post(&request(Schedule::Now), &fx.ctx()),
            Err(PublishError::MissingCredentials)
        ));
    }

    #[test]
    fn prepare_requires_record() {
        let fx = Fixture::new();
        let mut req = request(Schedule::Now);
        req.record_id = "missing".into();
        assert!(matches!(
            prepare_post(&req, &fx.ctx()),
            Err(PublishError::RecordNotFound(_))
        ));
    }

    #[test]
    fn prepare_requires_media_file() {
        let fx = Fixture::new();
        fs::remove_file(fx.tmp.path().join("a.png")).unwrap();
        assert!(matches!(
            prepare_post(&request(Schedule::Now), &fx.ctx()),
            Err(PublishError::MediaNotFound(_))
        ));
    }

    #[test]
    fn prepare_custom_video_media() {
        let fx = Fixture::new();
        let clip = fx.tmp.path().join("Clip.MP4");
        fs::write(&clip, b"video").unwrap();
        let mut req = request(Schedule::Now);
        req.custom_media = Some(clip.clone());
        let post = prepare_post(&req, &fx.ctx()).unwrap();
        assert_eq!(post.media, clip);
        assert_eq!(post.kind, MediaKind::Video);
        assert_eq!(post.kind.endpoint(), "videos");
    }

    // =========================================================================
    // publish_record
    // =========================================================================

    #[test]
    fn too_soon_schedule_never_reaches_publisher() {
        let fx = Fixture::new();
        let publisher = RecordingPublisher::default();
        let err = publish_record(&publisher, &request(at("2026-03-01 12:05")), &fx.ctx()).unwrap_err();
        assert!(matches!(err, PublishError::ScheduleTooSoon(_)));
        assert!(publisher.calls.borrow().is_empty());
    }

    #[test]
    fn valid_schedule_is_published() {
        let fx = Fixture::new();
        let publisher = RecordingPublisher::default();
        let mut req = request(at("2026-03-02 09:00"));
        req.first_comment = Some("First!".into());
        let receipt = publish_record(&publisher, &req, &fx.ctx()).unwrap();

        let calls = publisher.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].first_comment.as_deref(), Some("First!"));
        assert_eq!(
            receipt.scheduled_for,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap())
        );
    }

    // =========================================================================
    // Graph client helpers
    // =========================================================================

    #[test]
    fn media_kind_by_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a.webm")), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("a.png")), MediaKind::Photo);
        assert_eq!(MediaKind::from_path(Path::new("noext")), MediaKind::Photo);
    }

    #[test]
    fn attached_media_is_json() {
        assert_eq!(attached_media("99"), r#"{"media_fbid":"99"}"#);
    }

    #[test]
    fn graph_urls_are_versioned() {
        let publisher = GraphPublisher::new(&PublishConfig::default())
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(publisher.url("42/feed"), "http://localhost:9/v19.0/42/feed");
    }

    #[test]
    fn graph_error_message_falls_back() {
        let body: GraphResponse =
            serde_json::from_str(r#"{"error": {"message": "Invalid OAuth token", "code": 190}}"#).unwrap();
        assert_eq!(body.error_message("x"), "Invalid OAuth token");
        assert_eq!(GraphResponse::default().error_message("fallback"), "fallback");
    }
}
