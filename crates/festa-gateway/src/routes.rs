//! API route handlers for the gateway.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde_json::json;
use std::sync::Arc;

use festa_core::error::FestaError;
use festa_core::traits::RecordStore;
use festa_core::types::{BirthdayRecord, NotificationMessage, TokenResult};
use festa_scheduler::{PassScope, matcher, run_pass};

use super::server::{AppState, UserId};

/// Shorten a device token for display and logs.
fn mask_token(s: &str) -> String {
    match s.get(..12) {
        Some(prefix) if s.len() > 12 => format!("{prefix}••••"),
        _ => s.to_string(),
    }
}

/// Map a domain error onto the HTTP status it travels as.
fn error_status(e: &FestaError) -> StatusCode {
    match e {
        FestaError::NotFound(_) => StatusCode::NOT_FOUND,
        FestaError::Invalid(_) => StatusCode::BAD_REQUEST,
        FestaError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(e: FestaError) -> (StatusCode, Json<serde_json::Value>) {
    (error_status(&e), Json(json!({ "error": e.to_string() })))
}

/// Drop registrations the provider flagged as permanently dead.
/// Best-effort: a failed removal is retried implicitly on the next
/// send that hits the same token.
async fn prune_dead_tokens(store: &dyn RecordStore, results: &[TokenResult]) -> usize {
    let mut pruned = 0;
    for result in results {
        if result.success || !result.permanent {
            continue;
        }
        match store.unregister_token(&result.token).await {
            Ok(removed) => pruned += removed,
            Err(e) => tracing::warn!("⚠️ Token prune failed: {e}"),
        }
    }
    if pruned > 0 {
        tracing::info!("🧹 Pruned {pruned} dead device token(s)");
    }
    pruned
}

// ── Health ──────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "festa",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

// ── Cron entry ──────────────────────────────────────────────────────

/// GET /api/cron/check-birthdays
///
/// Entry point for the external scheduler. Authenticates with
/// `Authorization: Bearer <cron_secret>` and runs one delivery pass
/// across every owner.
pub async fn cron_check_birthdays(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let expected = &state.config.gateway.cron_secret;
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    // An unset secret rejects everything rather than opening the endpoint
    if expected.is_empty() || presented != format!("Bearer {expected}") {
        tracing::warn!("🚫 Cron request rejected: bad or missing bearer secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }

    let now = chrono::Local::now().naive_local();
    match run_pass(
        state.store.as_ref(),
        state.push.as_ref(),
        &PassScope::AllOwners,
        now,
    )
    .await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": report.summary(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "currentTime": now.format("%H:%M").to_string(),
                "notifications": report.outcomes,
            })),
        ),
        Err(e) => {
            tracing::error!("❌ Cron pass failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

// ── Birthdays ───────────────────────────────────────────────────────

/// GET /api/birthdays
///
/// The owner's records in calendar order, each enriched with the age
/// being turned and the date of the next occurrence.
pub async fn list_birthdays(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> (StatusCode, Json<serde_json::Value>) {
    let records = match state.store.list_birthdays(&user.0).await {
        Ok(records) => records,
        Err(e) => return error_body(e),
    };
    let today = chrono::Local::now().date_naive();
    let birthdays: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let next = matcher::next_occurrence(record.birth_date, today);
            let mut item = json!(record);
            item["age_turning"] = json!(matcher::age_turning(record.birth_date, next));
            item["next_occurrence"] = json!(next.format("%Y-%m-%d").to_string());
            item["days_until"] = json!((next - today).num_days());
            item
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({ "birthdays": birthdays, "count": birthdays.len() })),
    )
}

/// Copy the optional fields a create or update body may carry.
fn apply_optional_fields(record: &mut BirthdayRecord, body: &serde_json::Value) {
    if let Some(phone) = body["phone"].as_str() {
        record.phone = Some(phone.to_string()).filter(|s| !s.is_empty());
    }
    if let Some(email) = body["email"].as_str() {
        record.email = Some(email.to_string()).filter(|s| !s.is_empty());
    }
    if let Some(times) = body["notification_times"].as_array() {
        record.notification_times = times
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
    }
    if let Some(enabled) = body["notification_enabled"].as_bool() {
        record.notification_enabled = enabled;
    }
}

/// POST /api/birthdays
///
/// Body: `first_name`, `birth_date` (YYYY-MM-DD), and optionally
/// `last_name`, `phone`, `email`, `notification_times`,
/// `notification_enabled`.
pub async fn create_birthday(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let first_name = body["first_name"].as_str().unwrap_or("").trim();
    let birth_date = match body["birth_date"]
        .as_str()
        .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    {
        Some(date) => date,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "birth_date must be a YYYY-MM-DD date" })),
            );
        }
    };

    let mut record = BirthdayRecord::new(
        &user.0,
        first_name,
        body["last_name"].as_str().unwrap_or("").trim(),
        birth_date,
    );
    apply_optional_fields(&mut record, &body);
    if let Err(e) = record.normalize() {
        return error_body(e);
    }
    if let Err(e) = state.store.insert_birthday(&record).await {
        return error_body(e);
    }
    tracing::info!(
        "🎂 Birthday added: {} ({})",
        record.full_name(),
        record.birth_date
    );
    (StatusCode::CREATED, Json(json!({ "birthday": record })))
}

/// PUT /api/birthdays/{id}
///
/// Partial update; absent fields keep their stored values.
pub async fn update_birthday(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut record = match state.store.get_birthday(&user.0, &id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Birthday not found" })),
            );
        }
        Err(e) => return error_body(e),
    };

    if let Some(first_name) = body["first_name"].as_str() {
        record.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = body["last_name"].as_str() {
        record.last_name = last_name.trim().to_string();
    }
    if let Some(raw) = body["birth_date"].as_str() {
        match chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => record.birth_date = date,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "birth_date must be a YYYY-MM-DD date" })),
                );
            }
        }
    }
    apply_optional_fields(&mut record, &body);
    if let Err(e) = record.normalize() {
        return error_body(e);
    }
    record.touch();
    if let Err(e) = state.store.update_birthday(&record).await {
        return error_body(e);
    }
    (StatusCode::OK, Json(json!({ "birthday": record })))
}

/// DELETE /api/birthdays/{id}
pub async fn delete_birthday(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.delete_birthday(&user.0, &id).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Birthday not found" })),
        ),
        Err(e) => error_body(e),
    }
}

// ── Devices ─────────────────────────────────────────────────────────

/// POST /api/devices
///
/// Register (or refresh) this device's push token. Idempotent per
/// `(owner, token)` pair.
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let token = body["token"].as_str().unwrap_or("").trim();
    if token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "token is required" })),
        );
    }
    if let Err(e) = state.store.register_device(&user.0, token).await {
        return error_body(e);
    }
    tracing::info!("📲 Device registered for {}: {}", user.0, mask_token(token));
    (StatusCode::OK, Json(json!({ "success": true })))
}

/// GET /api/devices
///
/// The owner's registered devices, tokens masked for display.
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.devices_for(&user.0).await {
        Ok(devices) => {
            let devices: Vec<serde_json::Value> = devices
                .iter()
                .map(|d| json!({ "token": mask_token(&d.token), "updated_at": d.updated_at }))
                .collect();
            (
                StatusCode::OK,
                Json(json!({ "devices": devices, "count": devices.len() })),
            )
        }
        Err(e) => error_body(e),
    }
}

/// DELETE /api/devices/{token}
///
/// Remove a registration everywhere it appears; tokens identify a
/// device install, not an owner.
pub async fn unregister_device(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.unregister_token(&token).await {
        Ok(0) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Token not registered" })),
        ),
        Ok(removed) => {
            tracing::info!(
                "🧹 Unregistered device token {} ({removed} row(s))",
                mask_token(&token)
            );
            (
                StatusCode::OK,
                Json(json!({ "success": true, "removed": removed })),
            )
        }
        Err(e) => error_body(e),
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// GET /api/settings/notifications
pub async fn get_notification_setting(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.notifications_enabled(&user.0).await {
        Ok(enabled) => (StatusCode::OK, Json(json!({ "enabled": enabled }))),
        Err(e) => error_body(e),
    }
}

/// PUT /api/settings/notifications
///
/// Body: `{"enabled": bool}`. The per-owner master switch checked by
/// every delivery pass.
pub async fn set_notification_setting(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(enabled) = body["enabled"].as_bool() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "enabled must be a boolean" })),
        );
    };
    if let Err(e) = state.store.set_notifications_enabled(&user.0, enabled).await {
        return error_body(e);
    }
    if enabled {
        tracing::info!("🔔 Notifications enabled for {}", user.0);
    } else {
        tracing::info!("🔕 Notifications disabled for {}", user.0);
    }
    (
        StatusCode::OK,
        Json(json!({ "success": true, "enabled": enabled })),
    )
}

// ── Manual sends ────────────────────────────────────────────────────

/// Shared fan-out path for the manual send endpoints: resolve tokens,
/// short-circuit simulation, send, prune dead registrations.
async fn multicast_to(
    state: &AppState,
    owner: &str,
    explicit_tokens: Option<Vec<String>>,
    message: &NotificationMessage,
    success_message: &str,
) -> (StatusCode, Json<serde_json::Value>) {
    let tokens = match explicit_tokens {
        Some(tokens) if !tokens.is_empty() => tokens,
        _ => {
            let devices = match state.store.devices_for(owner).await {
                Ok(devices) => devices,
                Err(e) => return error_body(e),
            };
            devices.into_iter().map(|d| d.token).collect()
        }
    };
    if tokens.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No registered devices for this user" })),
        );
    }
    if !state.sender.is_configured() {
        tracing::info!("📴 Push provider unconfigured, send simulated");
        return (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({
                "error": "Push provider not configured",
                "simulation": true,
            })),
        );
    }

    match state.sender.send_multicast(message, &tokens).await {
        Ok(outcome) => {
            let pruned = prune_dead_tokens(state.store.as_ref(), &outcome.results).await;
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": success_message,
                    "successCount": outcome.success_count,
                    "failureCount": outcome.failure_count,
                    "totalTokens": tokens.len(),
                    "pruned": pruned,
                })),
            )
        }
        Err(e) => {
            tracing::error!("❌ Manual send failed: {e}");
            error_body(e)
        }
    }
}

/// POST /api/send-test-notification
///
/// Push a fixed test message to every device the caller has
/// registered; verifies the whole pipeline without touching records.
pub async fn send_test_notification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> (StatusCode, Json<serde_json::Value>) {
    multicast_to(
        &state,
        &user.0,
        None,
        &NotificationMessage::test(),
        "Test notification sent",
    )
    .await
}

/// POST /api/send-notification
///
/// Body: `{"birthdayId": "...", "fcmTokens": [...]?}`. Sends the real
/// reminder for one record immediately, defaulting to the caller's
/// registered devices when no explicit tokens are given. Without
/// provider credentials the send is skipped and reported as queued.
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(birthday_id) = body["birthdayId"].as_str() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "birthdayId is required" })),
        );
    };
    let record = match state.store.get_birthday(&user.0, birthday_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Birthday not found" })),
            );
        }
        Err(e) => return error_body(e),
    };
    let age = matcher::age_turning(record.birth_date, chrono::Local::now().date_naive());
    let message = NotificationMessage::birthday(&record, age);

    // The test endpoint reports missing credentials as 501; the one-off
    // send queues nothing and succeeds, before any device lookup
    if !state.sender.is_configured() {
        tracing::info!("📴 Push provider unconfigured, would send: {}", message.body);
        return (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Notification queued (push provider not configured)",
            })),
        );
    }

    let explicit = body["fcmTokens"].as_array().map(|tokens| {
        tokens
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect::<Vec<_>>()
    });
    let success_message = format!("Notification sent for {}", record.full_name());
    multicast_to(&state, &user.0, explicit, &message, &success_message).await
}
