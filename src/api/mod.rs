//! REST API module.
//!
//! Route handlers: authorization is applied as a router layer, validation
//! happens here before anything reaches persistence, and every failure is an
//! `AppError` rendered as the `{error, details?}` body.

mod assets;
mod cards;
mod content;
mod deploy;
mod events;
mod points;
mod sites;
mod templates;

pub use assets::*;
pub use cards::*;
pub use content::*;
pub use deploy::*;
pub use events::*;
pub use points::*;
pub use sites::*;
pub use templates::*;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::Site;

/// Fetch a site or fail with 404; shared by the nested `/sites/{id}/...` routes.
pub(crate) async fn require_site(repo: &Repository, site_id: &str) -> Result<Site, AppError> {
    repo.get_site(site_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Site {} not found", site_id)))
}
