//! Data models for the campaign microsite portal.
//!
//! Wire format is camelCase JSON; structurally-typed payloads (content bodies,
//! card manifests, geofences) are tagged unions validated at the API boundary.

mod asset;
mod card;
mod content;
mod event;
mod points;
mod site;
mod template;

pub use asset::*;
pub use card::*;
pub use content::*;
pub use event::*;
pub use points::*;
pub use site::*;
pub use template::*;
