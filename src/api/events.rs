//! Event and check-in API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::{
    CreateCheckInRequest, CreateEventRequest, CreatePointTransactionRequest, Event, EventCheckIn,
    LatLng, UpdateEventRequest,
};
use crate::AppState;

/// Source category tying check-ins to their point rule.
const CHECKIN_SOURCE: &str = "event_checkin";

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::Validation(format!("{} must be an RFC 3339 timestamp", field)))
}

/// GET /api/events - List all events.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.repo.list_events().await?))
}

/// GET /api/events/:id - Get a single event.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Event>, AppError> {
    let event = state
        .repo
        .get_event(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;
    Ok(Json(event))
}

/// POST /api/events - Create an event.
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    let starts = parse_timestamp("startsAt", &request.starts_at)?;
    let ends = parse_timestamp("endsAt", &request.ends_at)?;
    if ends <= starts {
        return Err(AppError::Validation(
            "endsAt must be after startsAt".to_string(),
        ));
    }
    if let Some(geofence) = &request.geofence {
        geofence.validate()?;
    }

    let event = state.repo.create_event(&request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PATCH /api/events/:id - Partially update an event.
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<Event>, AppError> {
    if let Some(starts_at) = &request.starts_at {
        parse_timestamp("startsAt", starts_at)?;
    }
    if let Some(ends_at) = &request.ends_at {
        parse_timestamp("endsAt", ends_at)?;
    }
    if let Some(geofence) = &request.geofence {
        geofence.validate()?;
    }
    let event = state.repo.update_event(&id, &request).await?;
    Ok(Json(event))
}

/// DELETE /api/events/:id - Delete an event and its check-ins.
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_event(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// GET /api/events/:id/checkins - List an event's check-ins.
pub async fn list_checkins(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<EventCheckIn>>, AppError> {
    state
        .repo
        .get_event(&event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
    Ok(Json(state.repo.list_checkins(&event_id).await?))
}

/// POST /api/events/:id/checkin - Check a user in to an event.
///
/// The event must be inside its time window, and when a geofence is set the
/// caller's coordinates must fall inside it. On success a check-in is
/// recorded and any matching point rule is applied to the ledger.
pub async fn check_in(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<CreateCheckInRequest>,
) -> Result<(StatusCode, Json<EventCheckIn>), AppError> {
    let event = state
        .repo
        .get_event(&event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;

    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }

    let starts = parse_timestamp("startsAt", &event.starts_at)?;
    let ends = parse_timestamp("endsAt", &event.ends_at)?;
    let now = Utc::now();
    if now < starts || now > ends {
        return Err(AppError::BadRequest("Event is not active".to_string()));
    }

    if let Some(geofence) = &event.geofence {
        let (lat, lng) = match (request.lat, request.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(AppError::BadRequest(
                    "Location is required to check in to this event".to_string(),
                ))
            }
        };
        let point = LatLng { lat, lng };
        if !point.is_valid() {
            return Err(AppError::Validation(
                "Coordinates are out of range".to_string(),
            ));
        }
        if !geofence.contains(point) {
            return Err(AppError::BadRequest(
                "Location is outside the event area".to_string(),
            ));
        }
    }

    let points = state
        .repo
        .find_rule_by_source(CHECKIN_SOURCE)
        .await?
        .map(|rule| rule.points)
        .unwrap_or(0);

    let checkin = state
        .repo
        .create_checkin(&event_id, &request.user_id, request.lat, request.lng, points)
        .await?;

    if points != 0 {
        state
            .repo
            .create_point_transaction(&CreatePointTransactionRequest {
                user_id: request.user_id.clone(),
                delta: points,
                tx_type: "earn".to_string(),
                source: CHECKIN_SOURCE.to_string(),
                metadata: Some(serde_json::json!({ "eventId": event_id })),
            })
            .await?;
    }

    Ok((StatusCode::CREATED, Json(checkin)))
}
