//! Event and check-in models, including geofence containment.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
pub fn haversine_distance_m(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// A circular or polygonal region gating event check-ins by location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum Geofence {
    #[serde(rename_all = "camelCase")]
    Circle { center: LatLng, radius_m: f64 },
    Polygon { vertices: Vec<LatLng> },
}

impl Geofence {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Geofence::Circle { center, radius_m } => {
                if !center.is_valid() {
                    return Err(AppError::Validation(
                        "Geofence center is out of range".to_string(),
                    ));
                }
                if *radius_m <= 0.0 {
                    return Err(AppError::Validation(
                        "Geofence radius must be positive".to_string(),
                    ));
                }
            }
            Geofence::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(AppError::Validation(
                        "Geofence polygon needs at least 3 vertices".to_string(),
                    ));
                }
                if vertices.iter().any(|v| !v.is_valid()) {
                    return Err(AppError::Validation(
                        "Geofence polygon vertex is out of range".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether the given point lies inside the fence.
    ///
    /// Polygon containment uses ray casting over lat/lng treated as planar,
    /// which is adequate at venue scale.
    pub fn contains(&self, point: LatLng) -> bool {
        match self {
            Geofence::Circle { center, radius_m } => {
                haversine_distance_m(*center, point) <= *radius_m
            }
            Geofence::Polygon { vertices } => {
                let mut inside = false;
                let n = vertices.len();
                let mut j = n - 1;
                for i in 0..n {
                    let (vi, vj) = (vertices[i], vertices[j]);
                    if (vi.lat > point.lat) != (vj.lat > point.lat)
                        && point.lng
                            < (vj.lng - vi.lng) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lng
                    {
                        inside = !inside;
                    }
                    j = i;
                }
                inside
            }
        }
    }
}

/// A live event with a time window and an optional geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence: Option<Geofence>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub geofence: Option<Geofence>,
}

/// Request body for partially updating an event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub geofence: Option<Geofence>,
}

/// A user's check-in against an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCheckIn {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub checked_in_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    pub points_awarded: i64,
}

/// Request body for checking in to an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckInRequest {
    pub user_id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}
