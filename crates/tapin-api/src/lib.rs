//! HTTP layer for the tapin attendance ledger.
//!
//! Exposes an axum [`Router`] serving the kiosk, registration, dashboard
//! and admin surfaces, backed by any [`AttendanceStore`].

pub mod admin;
pub mod auth;
pub mod error;
pub mod kiosk;
pub mod members;
pub mod registration;
pub mod stats;
pub mod teams;

pub use error::ApiError;

use std::{fmt, path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use chrono::NaiveTime;
use serde::Deserialize;
use tapin_core::{store::AttendanceStore, tz::OrgTz};

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// `TAPIN_*` environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  /// Public base URL used when building registration links for QR codes.
  #[serde(default = "default_base_url")]
  pub base_url:            String,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Club wall-clock offset from UTC, minutes east.
  #[serde(default = "default_utc_offset")]
  pub utc_offset_minutes:  i32,
  /// Local-time window inside which the bulk-logout route is allowed.
  #[serde(default = "default_window_start")]
  pub logout_window_start: String,
  #[serde(default = "default_window_end")]
  pub logout_window_end:   String,
  pub auth_username:       String,
  pub auth_password_hash:  String,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8730 }
fn default_base_url() -> String { "http://localhost:8730".to_string() }
fn default_store_path() -> PathBuf { PathBuf::from("tapin.db") }
fn default_utc_offset() -> i32 { tapin_core::tz::JST_OFFSET_MINUTES }
fn default_window_start() -> String { "22:50".to_string() }
fn default_window_end() -> String { "23:50".to_string() }

impl ServerConfig {
  pub fn org_tz(&self) -> Result<OrgTz, tapin_core::Error> {
    OrgTz::from_offset_minutes(self.utc_offset_minutes)
  }

  pub fn logout_window(&self) -> Result<LogoutWindow, chrono::ParseError> {
    LogoutWindow::parse(&self.logout_window_start, &self.logout_window_end)
  }
}

// ─── Logout window ────────────────────────────────────────────────────────────

/// An inclusive wall-clock window; `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutWindow {
  start: NaiveTime,
  end:   NaiveTime,
}

impl LogoutWindow {
  pub fn new(start: NaiveTime, end: NaiveTime) -> Self { Self { start, end } }

  /// Parse `"HH:MM"` bounds.
  pub fn parse(start: &str, end: &str) -> Result<Self, chrono::ParseError> {
    Ok(Self {
      start: NaiveTime::parse_from_str(start, "%H:%M")?,
      end:   NaiveTime::parse_from_str(end, "%H:%M")?,
    })
  }

  pub fn contains(&self, t: NaiveTime) -> bool {
    if self.start <= self.end {
      self.start <= t && t <= self.end
    } else {
      // Wraps midnight: inside means after the start or before the end.
      t >= self.start || t <= self.end
    }
  }
}

impl fmt::Display for LogoutWindow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: AttendanceStore> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
  pub tz:     OrgTz,
  pub window: LogoutWindow,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the attendance server.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  Router::new()
    // Kiosk
    .route("/api/kiosk/punch", post(kiosk::punch::<S>))
    // Registration
    .route("/api/register/tokens", post(registration::issue::<S>))
    .route("/api/register/tokens/{token}", get(registration::peek::<S>))
    .route(
      "/api/register/tokens/{token}/complete",
      post(registration::complete::<S>),
    )
    // Dashboard
    .route("/api/members", get(members::list::<S>))
    .route("/api/members/{id}/sessions", get(members::sessions::<S>))
    .route("/api/members/{id}/calendar", get(members::calendar::<S>))
    .route("/api/teams", get(teams::list::<S>).post(teams::create::<S>))
    .route(
      "/api/teams/{id}",
      put(teams::rename::<S>).delete(teams::delete::<S>),
    )
    .route("/api/teams/{id}/stats", get(teams::stats::<S>))
    .route("/api/stats/overview", get(stats::overview::<S>))
    .route("/api/stats/rollup", get(stats::rollup::<S>))
    // Admin
    .route("/api/admin/members", post(admin::upsert_member::<S>))
    .route("/api/admin/members/{id}/team", post(admin::assign_team::<S>))
    .route("/api/admin/members/{id}/toggle", post(admin::toggle::<S>))
    .route("/api/admin/members/{id}/card", put(admin::rebind::<S>))
    .route("/api/admin/force-logout", post(admin::force_logout::<S>))
    .route("/api/admin/logout-log", get(admin::logout_log::<S>))
    .route("/api/admin/tokens", get(registration::list::<S>))
    .route("/api/admin/tokens/{token}", delete(registration::delete::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use chrono::{Datelike, Duration, Utc};
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tapin_core::{
    event::CardId,
    roster::MemberStatus,
    store::NewMember,
  };
  use tapin_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  pub(crate) async fn make_state(password: &str) -> AppState<SqliteStore> {
    state_with_window(password, "00:00", "23:59").await
  }

  pub(crate) async fn state_with_window(
    password: &str,
    start: &str,
    end: &str,
  ) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    let config = ServerConfig {
      host:                "127.0.0.1".to_string(),
      port:                8730,
      base_url:            "http://localhost:8730".to_string(),
      store_path:          PathBuf::from(":memory:"),
      utc_offset_minutes:  tapin_core::tz::JST_OFFSET_MINUTES,
      logout_window_start: start.to_string(),
      logout_window_end:   end.to_string(),
      auth_username:       "staff".to_string(),
      auth_password_hash:  hash.clone(),
    };
    let tz = config.org_tz().unwrap();
    let window = config.logout_window().unwrap();

    AppState {
      store: Arc::new(store),
      config: Arc::new(config),
      auth: Arc::new(AuthConfig {
        username:      "staff".to_string(),
        password_hash: hash,
      }),
      tz,
      window,
    }
  }

  /// Window bounds as local `HH:MM` strings offset from the current moment,
  /// so window tests stay deterministic whenever they run.
  fn window_strings(start_mins: i64, end_mins: i64) -> (String, String) {
    let tz = OrgTz::jst();
    let fmt = |mins: i64| {
      tz.local_time(Utc::now() + Duration::minutes(mins))
        .format("%H:%M")
        .to_string()
    };
    (fmt(start_mins), fmt(end_mins))
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn send(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
      Some(v) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes =
      axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn seed_member(
    state: &AppState<SqliteStore>,
    name: &str,
    generation: i32,
    card: &str,
  ) -> Uuid {
    let user = Uuid::new_v4();
    state
      .store
      .upsert_member(NewMember {
        user_id:      user,
        display_name: Some(name.to_string()),
        generation,
        status:       MemberStatus::HighSchool,
      })
      .await
      .unwrap();
    state
      .store
      .rebind_card(user, CardId::normalize(card).unwrap())
      .await
      .unwrap();
    user
  }

  // ── Kiosk ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn punch_toggles_in_then_out() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    seed_member(&state, "alice", 1, "04:aa:01").await;

    let (status, body) = send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "04:aa:01" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["kind"], "in");
    assert_eq!(body["display_name"], "alice");

    let (status, body) = send(
      state,
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "04AA01" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["kind"], "out");
  }

  #[tokio::test]
  async fn punch_with_unknown_card_is_404() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (status, body) = send(
      state,
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "deadbeef" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("not registered"), "message: {message}");
  }

  #[tokio::test]
  async fn punch_with_empty_card_is_400() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (status, _) = send(
      state,
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "::" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn punch_without_credentials_is_401() {
    let state = make_state("secret").await;

    let mut builder =
      Request::builder().method("POST").uri("/api/kiosk/punch");
    builder = builder.header(header::CONTENT_TYPE, "application/json");
    let req = builder
      .body(Body::from(json!({ "card_id": "04aa01" }).to_string()))
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  // ── Registration ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn registration_flow_binds_a_card() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = Uuid::new_v4();

    let (status, issued) = send(
      state.clone(),
      "POST",
      "/api/register/tokens",
      Some(&auth),
      Some(json!({ "card_id": "05:1a:2b:3c" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = issued["token"]["token"].as_str().unwrap().to_string();
    assert!(token.starts_with("qr_"));
    let url = issued["registration_url"].as_str().unwrap();
    assert!(url.ends_with(&token), "url: {url}");

    // Not opened yet: the admin list shows it untouched.
    let (_, pending) =
      send(state.clone(), "GET", "/api/admin/tokens", Some(&auth), None)
        .await;
    assert_eq!(pending[0]["accessed_at"], Value::Null);

    // The registration page poll needs no credentials and stamps the
    // first access.
    let (status, peeked) = send(
      state.clone(),
      "GET",
      &format!("/api/register/tokens/{token}"),
      None,
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(peeked["state"], "accessed");
    assert_ne!(peeked["token"]["accessed_at"], Value::Null);

    let (status, binding) = send(
      state.clone(),
      "POST",
      &format!("/api/register/tokens/{token}/complete"),
      None,
      Some(json!({ "user_id": user })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(binding["user_id"], user.to_string());
    assert_eq!(binding["card_id"], "051a2b3c");

    // The freshly bound card punches straight away, whatever the reader's
    // spelling.
    let (status, punched) = send(
      state,
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "05:1A:2B:3C" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(punched["event"]["user_id"], user.to_string());
  }

  #[tokio::test]
  async fn peeking_an_unknown_token_is_404() {
    let state = make_state("secret").await;
    let (status, _) =
      send(state, "GET", "/api/register/tokens/qr_nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn completing_twice_is_409() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (_, issued) = send(
      state.clone(),
      "POST",
      "/api/register/tokens",
      Some(&auth),
      Some(json!({ "card_id": "ab01" })),
    )
    .await;
    let token = issued["token"]["token"].as_str().unwrap().to_string();
    let uri = format!("/api/register/tokens/{token}/complete");

    let (status, _) = send(
      state.clone(),
      "POST",
      &uri,
      None,
      Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
      state,
      "POST",
      &uri,
      None,
      Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("already been used"), "message: {message}");
  }

  #[tokio::test]
  async fn completing_an_expired_token_is_410() {
    let state = make_state("secret").await;
    // Seeded past its expiry; the API cannot mint one of these.
    let expired = state
      .store
      .issue_token(
        CardId::normalize("ab02").unwrap(),
        Duration::seconds(-1),
      )
      .await
      .unwrap();

    let (status, _) = send(
      state,
      "POST",
      &format!("/api/register/tokens/{}/complete", expired.token),
      None,
      Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
  }

  #[tokio::test]
  async fn issuing_with_a_bad_ttl_is_400() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (status, _) = send(
      state,
      "POST",
      "/api/register/tokens",
      Some(&auth),
      Some(json!({ "card_id": "ab03", "ttl_minutes": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn issuing_for_a_bound_card_is_409() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    seed_member(&state, "bob", 1, "ab04").await;

    let (status, _) = send(
      state,
      "POST",
      "/api/register/tokens",
      Some(&auth),
      Some(json!({ "card_id": "ab04" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn deleting_a_pending_token_is_204_then_404() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (_, issued) = send(
      state.clone(),
      "POST",
      "/api/register/tokens",
      Some(&auth),
      Some(json!({ "card_id": "ab05" })),
    )
    .await;
    let token = issued["token"]["token"].as_str().unwrap().to_string();
    let uri = format!("/api/admin/tokens/{token}");

    let (status, _) =
      send(state.clone(), "DELETE", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(state, "DELETE", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Roster and history ──────────────────────────────────────────────────

  #[tokio::test]
  async fn roster_reports_presence() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    seed_member(&state, "alice", 1, "c0a1").await;
    seed_member(&state, "bob", 2, "c0a2").await;

    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "c0a1" })),
    )
    .await;

    let (status, body) =
      send(state, "GET", "/api/members", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let roster = body.as_array().unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0]["member"]["display_name"], "alice");
    assert_eq!(roster[0]["last_kind"], "in");
    assert_eq!(roster[1]["member"]["display_name"], "bob");
    assert_eq!(roster[1]["last_kind"], Value::Null);
  }

  #[tokio::test]
  async fn sessions_pair_the_days_punches() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = seed_member(&state, "alice", 1, "c0b1").await;

    for _ in 0..2 {
      send(
        state.clone(),
        "POST",
        "/api/kiosk/punch",
        Some(&auth),
        Some(json!({ "card_id": "c0b1" })),
      )
      .await;
    }

    let uri =
      format!("/api/members/{user}/sessions?from=2000-01-01&to=2100-01-01");
    let (status, body) = send(state, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_ne!(sessions[0]["ended_at"], Value::Null);
    assert_eq!(body["total_seconds"], sessions[0]["duration_seconds"]);
  }

  #[tokio::test]
  async fn live_sessions_count_the_open_tail() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = seed_member(&state, "alice", 1, "c0b2").await;

    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "c0b2" })),
    )
    .await;

    let base =
      format!("/api/members/{user}/sessions?from=2000-01-01&to=2100-01-01");
    let (_, closed_only) =
      send(state.clone(), "GET", &base, Some(&auth), None).await;
    assert_eq!(closed_only["total_seconds"], 0);

    let (_, live) =
      send(state, "GET", &format!("{base}&live=true"), Some(&auth), None)
        .await;
    assert!(live["total_seconds"].as_i64().unwrap() >= 0);
    assert_eq!(live["sessions"][0]["ended_at"], Value::Null);
  }

  #[tokio::test]
  async fn inverted_session_range_is_400() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = Uuid::new_v4();

    let uri =
      format!("/api/members/{user}/sessions?from=2024-06-09&to=2024-06-03");
    let (status, _) = send(state, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn calendar_lists_presence_dates() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = seed_member(&state, "alice", 1, "c0c1").await;

    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "c0c1" })),
    )
    .await;

    let today = OrgTz::jst().local_date(Utc::now());
    let uri = format!(
      "/api/members/{user}/calendar?year={}&month={}",
      today.year(),
      today.month()
    );
    let (status, body) = send(state, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let dates = body["dates"].as_array().unwrap();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0], today.format("%Y-%m-%d").to_string());
  }

  #[tokio::test]
  async fn calendar_with_a_bad_month_is_400() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = Uuid::new_v4();

    let uri = format!("/api/members/{user}/calendar?year=2024&month=13");
    let (status, _) = send(state, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Teams ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn team_lifecycle_and_conflicts() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (status, team) = send(
      state.clone(),
      "POST",
      "/api/teams",
      Some(&auth),
      Some(json!({ "name": "robotics" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let team_id = team["team_id"].as_str().unwrap().to_string();

    let (status, _) = send(
      state.clone(),
      "POST",
      "/api/teams",
      Some(&auth),
      Some(json!({ "name": "robotics" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, renamed) = send(
      state.clone(),
      "PUT",
      &format!("/api/teams/{team_id}"),
      Some(&auth),
      Some(json!({ "name": "rocketry" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "rocketry");

    let member = seed_member(&state, "alice", 1, "d0a1").await;
    let (status, _) = send(
      state.clone(),
      "POST",
      &format!("/api/admin/members/{member}/team"),
      Some(&auth),
      Some(json!({ "team_id": team_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Refused while a member is still assigned.
    let (status, _) = send(
      state.clone(),
      "DELETE",
      &format!("/api/teams/{team_id}"),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
      state.clone(),
      "POST",
      &format!("/api/admin/members/{member}/team"),
      Some(&auth),
      Some(json!({ "team_id": null })),
    )
    .await;

    let (status, _) = send(
      state.clone(),
      "DELETE",
      &format!("/api/teams/{team_id}"),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
      state,
      "DELETE",
      &format!("/api/teams/{team_id}"),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn blank_team_names_are_400() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (status, _) = send(
      state,
      "POST",
      "/api/teams",
      Some(&auth),
      Some(json!({ "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn stats_for_an_unknown_team_is_404() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let uri = format!("/api/teams/{}/stats", Uuid::new_v4());
    let (status, _) = send(state, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Stats ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn overview_counts_todays_attendees() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    seed_member(&state, "alice", 1, "e0a1").await;
    seed_member(&state, "bob", 2, "e0a2").await;

    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "e0a1" })),
    )
    .await;

    let (status, body) =
      send(state, "GET", "/api/stats/overview", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["today_attendees"], 1);
    assert_eq!(body["member_count"], 2);
    assert_eq!(body["active_days"], 1);
    // The only session is still open, so no closed hours yet.
    assert_eq!(body["total_activity_hours"], 0.0);
  }

  #[tokio::test]
  async fn rollup_buckets_by_team() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");

    let (_, team) = send(
      state.clone(),
      "POST",
      "/api/teams",
      Some(&auth),
      Some(json!({ "name": "robotics" })),
    )
    .await;
    let member = seed_member(&state, "alice", 1, "e0b1").await;
    send(
      state.clone(),
      "POST",
      &format!("/api/admin/members/{member}/team"),
      Some(&auth),
      Some(json!({ "team_id": team["team_id"] })),
    )
    .await;
    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "e0b1" })),
    )
    .await;

    let uri =
      "/api/stats/rollup?from=2000-01-01&to=2100-01-01&grouping=team";
    let (status, body) = send(state, "GET", uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let days = body.as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["total"], 1);
    assert_eq!(days[0]["teams"]["robotics"]["count"], 1);
  }

  // ── Admin ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn directory_sync_then_toggle_and_rebind() {
    let state = make_state("secret").await;
    let auth = auth_header("staff", "secret");
    let user = Uuid::new_v4();

    let (status, member) = send(
      state.clone(),
      "POST",
      "/api/admin/members",
      Some(&auth),
      Some(json!({
        "user_id": user,
        "display_name": "carol",
        "generation": 3,
        "status": "high_school",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["display_name"], "carol");

    let (status, _) = send(
      state.clone(),
      "PUT",
      &format!("/api/admin/members/{user}/card"),
      Some(&auth),
      Some(json!({ "card_id": "f0a1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, event) = send(
      state.clone(),
      "POST",
      &format!("/api/admin/members/{user}/toggle"),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["kind"], "in");

    // Someone else's card cannot be taken over this way.
    seed_member(&state, "dave", 1, "f0a2").await;
    let (status, _) = send(
      state,
      "PUT",
      &format!("/api/admin/members/{user}/card"),
      Some(&auth),
      Some(json!({ "card_id": "f0a2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn force_logout_outside_the_window_is_403() {
    let (start, end) = window_strings(120, 180);
    let state = state_with_window("secret", &start, &end).await;
    let auth = auth_header("staff", "secret");

    let (status, body) =
      send(state, "POST", "/api/admin/force-logout", Some(&auth), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("logout window"), "message: {message}");
  }

  #[tokio::test]
  async fn force_logout_sweeps_inside_the_window() {
    let (start, end) = window_strings(-60, 60);
    let state = state_with_window("secret", &start, &end).await;
    let auth = auth_header("staff", "secret");
    seed_member(&state, "alice", 1, "f0b1").await;

    send(
      state.clone(),
      "POST",
      "/api/kiosk/punch",
      Some(&auth),
      Some(json!({ "card_id": "f0b1" })),
    )
    .await;

    let (status, sweep) = send(
      state.clone(),
      "POST",
      "/api/admin/force-logout",
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sweep["affected"], 1);
    assert_eq!(sweep["entry"]["outcome"], "success");

    let (_, log) = send(
      state.clone(),
      "GET",
      "/api/admin/logout-log",
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(log.as_array().unwrap().len(), 1);
    assert_eq!(log[0]["affected_count"], 1);

    let (_, roster) =
      send(state, "GET", "/api/members", Some(&auth), None).await;
    assert_eq!(roster[0]["last_kind"], "out");
  }

  #[tokio::test]
  async fn admin_routes_reject_missing_credentials() {
    let state = make_state("secret").await;
    let (status, _) =
      send(state, "GET", "/api/admin/tokens", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }
}
