//! Database repository for CRUD operations.
//!
//! All reads and writes go through this type; handlers never touch the pool
//! directly.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Asset, AssetKind, CardManifest, CardManifestBody, ContentBody, ContentItem,
    CreateCardRequest, CreateContentRequest, CreateEventRequest, CreatePointRuleRequest,
    CreatePointTransactionRequest, CreateSiteRequest, CreateTemplateRequest, DeploymentStatus,
    Event, EventCheckIn, Geofence, PointRule, PointTransaction, Site, SiteStatus, Template,
    UpdateCardRequest, UpdateContentRequest, UpdateEventRequest, UpdatePointRuleRequest,
    UpdateSiteRequest, UpdateTemplateRequest,
};

/// Partial update of a site's deployment bookkeeping fields.
///
/// `None` leaves the stored value untouched; this is what makes the status
/// paths idempotent upserts rather than blind overwrites.
#[derive(Debug, Default, Clone)]
pub struct DeploymentUpdate {
    pub hosting_project_id: Option<String>,
    pub hosting_deployment_id: Option<String>,
    pub deployment_url: Option<String>,
    pub deployment_status: Option<DeploymentStatus>,
    pub last_deployed_at: Option<String>,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

const SITE_COLUMNS: &str = "id, name, display_name, slug, status, template_id, user_management, \
     auth_publishable_key, auth_secret_key, hosting_project_id, hosting_deployment_id, \
     deployment_url, deployment_status, last_deployed_at, created_at, updated_at";

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== SITE OPERATIONS ====================

    /// List all sites.
    pub async fn list_sites(&self) -> Result<Vec<Site>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sites ORDER BY created_at",
            SITE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(site_from_row).collect()
    }

    /// Get a site by ID.
    pub async fn get_site(&self, id: &str) -> Result<Option<Site>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM sites WHERE id = ?", SITE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    /// Find the site owning a hosting deployment id.
    pub async fn find_site_by_deployment_id(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Site>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sites WHERE hosting_deployment_id = ?",
            SITE_COLUMNS
        ))
        .bind(deployment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    /// Find the site owning a hosting project id.
    pub async fn find_site_by_project_id(
        &self,
        project_id: &str,
    ) -> Result<Option<Site>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sites WHERE hosting_project_id = ?",
            SITE_COLUMNS
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    /// Create a new site. A colliding slug surfaces as a conflict.
    pub async fn create_site(&self, request: &CreateSiteRequest) -> Result<Site, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sites (id, name, display_name, slug, status, template_id, \
             user_management, auth_publishable_key, auth_secret_key, deployment_status, \
             created_at, updated_at) VALUES (?, ?, ?, ?, 'draft', ?, ?, ?, ?, 'idle', ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.display_name)
        .bind(&request.slug)
        .bind(&request.template_id)
        .bind(request.user_management as i32)
        .bind(&request.auth_publishable_key)
        .bind(&request.auth_secret_key)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Slug '{}' is already in use", request.slug))
            }
            other => other,
        })?;

        self.get_site(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Site vanished after insert".to_string()))
    }

    /// Partially update a site. Deployment bookkeeping is not touched here.
    pub async fn update_site(
        &self,
        id: &str,
        request: &UpdateSiteRequest,
    ) -> Result<Site, AppError> {
        let existing = self
            .get_site(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.as_ref().unwrap_or(&existing.name);
        let display_name = request
            .display_name
            .as_ref()
            .unwrap_or(&existing.display_name);
        let slug = request.slug.as_ref().unwrap_or(&existing.slug);
        let status = request.status.unwrap_or(existing.status);
        let template_id = request.template_id.clone().or(existing.template_id.clone());
        let user_management = request.user_management.unwrap_or(existing.user_management);
        let auth_publishable_key = request
            .auth_publishable_key
            .clone()
            .or(existing.auth_publishable_key.clone());
        let auth_secret_key = request
            .auth_secret_key
            .clone()
            .or(existing.auth_secret_key.clone());

        sqlx::query(
            "UPDATE sites SET name = ?, display_name = ?, slug = ?, status = ?, template_id = ?, \
             user_management = ?, auth_publishable_key = ?, auth_secret_key = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(name)
        .bind(display_name)
        .bind(slug)
        .bind(status.as_str())
        .bind(&template_id)
        .bind(user_management as i32)
        .bind(&auth_publishable_key)
        .bind(&auth_secret_key)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Slug '{}' is already in use", slug))
            }
            other => other,
        })?;

        self.get_site(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site {} not found", id)))
    }

    /// Delete a site; content, assets and card manifests cascade.
    pub async fn delete_site(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Site {} not found", id)));
        }
        Ok(())
    }

    /// Apply a deployment bookkeeping update. Only the deploy, status and
    /// webhook paths call this.
    pub async fn update_deployment(
        &self,
        site_id: &str,
        update: &DeploymentUpdate,
    ) -> Result<Site, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE sites SET \
             hosting_project_id = COALESCE(?, hosting_project_id), \
             hosting_deployment_id = COALESCE(?, hosting_deployment_id), \
             deployment_url = COALESCE(?, deployment_url), \
             deployment_status = COALESCE(?, deployment_status), \
             last_deployed_at = COALESCE(?, last_deployed_at), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(&update.hosting_project_id)
        .bind(&update.hosting_deployment_id)
        .bind(&update.deployment_url)
        .bind(update.deployment_status.map(|s| s.as_str()))
        .bind(&update.last_deployed_at)
        .bind(&now)
        .bind(site_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Site {} not found", site_id)));
        }

        self.get_site(site_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site {} not found", site_id)))
    }

    // ==================== CONTENT OPERATIONS ====================

    /// List a site's content, grouped by section and ascending by order.
    pub async fn list_content(&self, site_id: &str) -> Result<Vec<ContentItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, site_id, section, body, sort_order, visible, created_at, updated_at \
             FROM content_items WHERE site_id = ? ORDER BY section, sort_order",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(content_from_row).collect()
    }

    /// Get a content item by ID.
    pub async fn get_content(&self, id: &str) -> Result<Option<ContentItem>, AppError> {
        let row = sqlx::query(
            "SELECT id, site_id, section, body, sort_order, visible, created_at, updated_at \
             FROM content_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(content_from_row).transpose()
    }

    /// Create a content item for a site.
    pub async fn create_content(
        &self,
        site_id: &str,
        request: &CreateContentRequest,
    ) -> Result<ContentItem, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let body_json = serde_json::to_string(&request.body)?;

        sqlx::query(
            "INSERT INTO content_items (id, site_id, section, body, sort_order, visible, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(site_id)
        .bind(&request.section)
        .bind(&body_json)
        .bind(request.order)
        .bind(request.visible as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(ContentItem {
            id,
            site_id: site_id.to_string(),
            section: request.section.clone(),
            body: request.body.clone(),
            order: request.order,
            visible: request.visible,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update a content item.
    pub async fn update_content(
        &self,
        id: &str,
        request: &UpdateContentRequest,
    ) -> Result<ContentItem, AppError> {
        let existing = self
            .get_content(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Content item {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let section = request.section.as_ref().unwrap_or(&existing.section);
        let body = request.body.as_ref().unwrap_or(&existing.body);
        let order = request.order.unwrap_or(existing.order);
        let visible = request.visible.unwrap_or(existing.visible);
        let body_json = serde_json::to_string(body)?;

        sqlx::query(
            "UPDATE content_items SET section = ?, body = ?, sort_order = ?, visible = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(section)
        .bind(&body_json)
        .bind(order)
        .bind(visible as i32)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(ContentItem {
            id: id.to_string(),
            site_id: existing.site_id,
            section: section.clone(),
            body: body.clone(),
            order,
            visible,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a content item.
    pub async fn delete_content(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Content item {} not found", id)));
        }
        Ok(())
    }

    // ==================== ASSET OPERATIONS ====================

    /// List a site's assets.
    pub async fn list_assets(&self, site_id: &str) -> Result<Vec<Asset>, AppError> {
        let rows = sqlx::query(
            "SELECT id, site_id, kind, url, filename, content_type, size, created_at, updated_at \
             FROM assets WHERE site_id = ? ORDER BY created_at",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(asset_from_row).collect())
    }

    /// Get an asset by ID.
    pub async fn get_asset(&self, id: &str) -> Result<Option<Asset>, AppError> {
        let row = sqlx::query(
            "SELECT id, site_id, kind, url, filename, content_type, size, created_at, updated_at \
             FROM assets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(asset_from_row))
    }

    /// Find an asset by its storage URL.
    pub async fn find_asset_by_url(&self, url: &str) -> Result<Option<Asset>, AppError> {
        let row = sqlx::query(
            "SELECT id, site_id, kind, url, filename, content_type, size, created_at, updated_at \
             FROM assets WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(asset_from_row))
    }

    /// Record an uploaded asset.
    pub async fn create_asset(
        &self,
        site_id: &str,
        url: &str,
        filename: &str,
        content_type: &str,
        size: Option<i64>,
    ) -> Result<Asset, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let kind = AssetKind::from_mime(content_type);

        sqlx::query(
            "INSERT INTO assets (id, site_id, kind, url, filename, content_type, size, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(site_id)
        .bind(kind.as_str())
        .bind(url)
        .bind(filename)
        .bind(content_type)
        .bind(size)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Asset {
            id,
            site_id: site_id.to_string(),
            kind,
            url: url.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Fill in the byte size reported asynchronously by the storage provider.
    pub async fn update_asset_size(&self, id: &str, size: i64) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE assets SET size = ?, updated_at = ? WHERE id = ?")
            .bind(size)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset {} not found", id)));
        }
        Ok(())
    }

    /// Delete an asset row.
    pub async fn delete_asset(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset {} not found", id)));
        }
        Ok(())
    }

    // ==================== CARD MANIFEST OPERATIONS ====================

    /// List a site's card manifests, oldest first.
    pub async fn list_cards(&self, site_id: &str) -> Result<Vec<CardManifest>, AppError> {
        let rows = sqlx::query(
            "SELECT id, site_id, manifest, active, created_at, updated_at \
             FROM card_manifests WHERE site_id = ? ORDER BY created_at",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(card_from_row).collect()
    }

    /// The active card for rendering: first active manifest by creation time.
    pub async fn first_active_card(&self, site_id: &str) -> Result<Option<CardManifest>, AppError> {
        let row = sqlx::query(
            "SELECT id, site_id, manifest, active, created_at, updated_at \
             FROM card_manifests WHERE site_id = ? AND active = 1 \
             ORDER BY created_at LIMIT 1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(card_from_row).transpose()
    }

    /// Get a card manifest by ID.
    pub async fn get_card(&self, id: &str) -> Result<Option<CardManifest>, AppError> {
        let row = sqlx::query(
            "SELECT id, site_id, manifest, active, created_at, updated_at \
             FROM card_manifests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(card_from_row).transpose()
    }

    /// Create a card manifest for a site.
    pub async fn create_card(
        &self,
        site_id: &str,
        request: &CreateCardRequest,
    ) -> Result<CardManifest, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let manifest_json = serde_json::to_string(&request.manifest)?;

        sqlx::query(
            "INSERT INTO card_manifests (id, site_id, manifest, active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(site_id)
        .bind(&manifest_json)
        .bind(request.active as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(CardManifest {
            id,
            site_id: site_id.to_string(),
            manifest: request.manifest.clone(),
            active: request.active,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update a card manifest.
    pub async fn update_card(
        &self,
        id: &str,
        request: &UpdateCardRequest,
    ) -> Result<CardManifest, AppError> {
        let existing = self
            .get_card(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Card manifest {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let manifest = request.manifest.as_ref().unwrap_or(&existing.manifest);
        let active = request.active.unwrap_or(existing.active);
        let manifest_json = serde_json::to_string(manifest)?;

        sqlx::query(
            "UPDATE card_manifests SET manifest = ?, active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&manifest_json)
        .bind(active as i32)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(CardManifest {
            id: id.to_string(),
            site_id: existing.site_id,
            manifest: manifest.clone(),
            active,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a card manifest.
    pub async fn delete_card(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM card_manifests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Card manifest {} not found", id)));
        }
        Ok(())
    }

    // ==================== TEMPLATE OPERATIONS ====================

    /// List all templates.
    pub async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM templates ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    /// Get a template by ID.
    pub async fn get_template(&self, id: &str) -> Result<Option<Template>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM templates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(template_from_row))
    }

    /// Create a template; names are unique.
    pub async fn create_template(
        &self,
        request: &CreateTemplateRequest,
    ) -> Result<Template, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO templates (id, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Template '{}' already exists", request.name))
            }
            other => other,
        })?;

        Ok(Template {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update a template.
    pub async fn update_template(
        &self,
        id: &str,
        request: &UpdateTemplateRequest,
    ) -> Result<Template, AppError> {
        let existing = self
            .get_template(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.as_ref().unwrap_or(&existing.name);
        let description = request.description.clone().or(existing.description.clone());

        sqlx::query("UPDATE templates SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&description)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Template {
            id: id.to_string(),
            name: name.clone(),
            description,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a template.
    pub async fn delete_template(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Template {} not found", id)));
        }
        Ok(())
    }

    // ==================== POINT RULE / TRANSACTION OPERATIONS ====================

    /// List all point rules.
    pub async fn list_point_rules(&self) -> Result<Vec<PointRule>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, points, source, created_at, updated_at \
             FROM point_rules ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(point_rule_from_row).collect())
    }

    /// Get a point rule by ID.
    pub async fn get_point_rule(&self, id: &str) -> Result<Option<PointRule>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, points, source, created_at, updated_at \
             FROM point_rules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(point_rule_from_row))
    }

    /// First rule matching a source category, if any.
    pub async fn find_rule_by_source(&self, source: &str) -> Result<Option<PointRule>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, points, source, created_at, updated_at \
             FROM point_rules WHERE source = ? ORDER BY created_at LIMIT 1",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(point_rule_from_row))
    }

    /// Create a point rule.
    pub async fn create_point_rule(
        &self,
        request: &CreatePointRuleRequest,
    ) -> Result<PointRule, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO point_rules (id, name, points, source, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(request.points)
        .bind(&request.source)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(PointRule {
            id,
            name: request.name.clone(),
            points: request.points,
            source: request.source.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update a point rule.
    pub async fn update_point_rule(
        &self,
        id: &str,
        request: &UpdatePointRuleRequest,
    ) -> Result<PointRule, AppError> {
        let existing = self
            .get_point_rule(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Point rule {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.as_ref().unwrap_or(&existing.name);
        let points = request.points.unwrap_or(existing.points);
        let source = request.source.as_ref().unwrap_or(&existing.source);

        sqlx::query(
            "UPDATE point_rules SET name = ?, points = ?, source = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(points)
        .bind(source)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(PointRule {
            id: id.to_string(),
            name: name.clone(),
            points,
            source: source.clone(),
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a point rule.
    pub async fn delete_point_rule(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM point_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Point rule {} not found", id)));
        }
        Ok(())
    }

    /// Append a point transaction to the ledger.
    pub async fn create_point_transaction(
        &self,
        request: &CreatePointTransactionRequest,
    ) -> Result<PointTransaction, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let metadata_json = request
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO point_transactions (id, user_id, delta, tx_type, source, metadata, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(request.delta)
        .bind(&request.tx_type)
        .bind(&request.source)
        .bind(&metadata_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(PointTransaction {
            id,
            user_id: request.user_id.clone(),
            delta: request.delta,
            tx_type: request.tx_type.clone(),
            source: request.source.clone(),
            metadata: request.metadata.clone(),
            created_at: now,
        })
    }

    /// List ledger entries, optionally filtered by user, newest first.
    pub async fn list_point_transactions(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<PointTransaction>, AppError> {
        let rows = match user_id {
            Some(user) => {
                sqlx::query(
                    "SELECT id, user_id, delta, tx_type, source, metadata, created_at \
                     FROM point_transactions WHERE user_id = ? ORDER BY created_at DESC",
                )
                .bind(user)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, delta, tx_type, source, metadata, created_at \
                     FROM point_transactions ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(point_transaction_from_row).collect())
    }

    // ==================== EVENT / CHECK-IN OPERATIONS ====================

    /// List all events.
    pub async fn list_events(&self) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, starts_at, ends_at, location, geofence, created_at, updated_at \
             FROM events ORDER BY starts_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, starts_at, ends_at, location, geofence, created_at, updated_at \
             FROM events WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// Create an event.
    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<Event, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let geofence_json = request
            .geofence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO events (id, name, starts_at, ends_at, location, geofence, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.starts_at)
        .bind(&request.ends_at)
        .bind(&request.location)
        .bind(&geofence_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Event {
            id,
            name: request.name.clone(),
            starts_at: request.starts_at.clone(),
            ends_at: request.ends_at.clone(),
            location: request.location.clone(),
            geofence: request.geofence.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update an event.
    pub async fn update_event(
        &self,
        id: &str,
        request: &UpdateEventRequest,
    ) -> Result<Event, AppError> {
        let existing = self
            .get_event(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.as_ref().unwrap_or(&existing.name);
        let starts_at = request.starts_at.as_ref().unwrap_or(&existing.starts_at);
        let ends_at = request.ends_at.as_ref().unwrap_or(&existing.ends_at);
        let location = request.location.clone().or(existing.location.clone());
        let geofence = request.geofence.clone().or(existing.geofence.clone());
        let geofence_json = geofence.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            "UPDATE events SET name = ?, starts_at = ?, ends_at = ?, location = ?, geofence = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(starts_at)
        .bind(ends_at)
        .bind(&location)
        .bind(&geofence_json)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Event {
            id: id.to_string(),
            name: name.clone(),
            starts_at: starts_at.clone(),
            ends_at: ends_at.clone(),
            location,
            geofence,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete an event; check-ins cascade.
    pub async fn delete_event(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Event {} not found", id)));
        }
        Ok(())
    }

    /// Record a check-in against an event.
    pub async fn create_checkin(
        &self,
        event_id: &str,
        user_id: &str,
        lat: Option<f64>,
        lng: Option<f64>,
        points_awarded: i64,
    ) -> Result<EventCheckIn, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO event_checkins (id, event_id, user_id, checked_in_at, lat, lng, \
             points_awarded) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(event_id)
        .bind(user_id)
        .bind(&now)
        .bind(lat)
        .bind(lng)
        .bind(points_awarded)
        .execute(&self.pool)
        .await?;

        Ok(EventCheckIn {
            id,
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            checked_in_at: now,
            lat,
            lng,
            points_awarded,
        })
    }

    /// List an event's check-ins, newest first.
    pub async fn list_checkins(&self, event_id: &str) -> Result<Vec<EventCheckIn>, AppError> {
        let rows = sqlx::query(
            "SELECT id, event_id, user_id, checked_in_at, lat, lng, points_awarded \
             FROM event_checkins WHERE event_id = ? ORDER BY checked_in_at DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(checkin_from_row).collect())
    }
}

// Helper functions for row conversion

fn site_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Site, AppError> {
    let status_str: String = row.get("status");
    let deployment_status_str: String = row.get("deployment_status");
    let user_management: i32 = row.get("user_management");

    Ok(Site {
        id: row.get("id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        slug: row.get("slug"),
        status: SiteStatus::from_str(&status_str)
            .ok_or_else(|| AppError::Database(format!("Unknown site status '{}'", status_str)))?,
        template_id: row.get("template_id"),
        user_management: user_management != 0,
        auth_publishable_key: row.get("auth_publishable_key"),
        auth_secret_key: row.get("auth_secret_key"),
        hosting_project_id: row.get("hosting_project_id"),
        hosting_deployment_id: row.get("hosting_deployment_id"),
        deployment_url: row.get("deployment_url"),
        deployment_status: DeploymentStatus::from_str(&deployment_status_str).ok_or_else(|| {
            AppError::Database(format!(
                "Unknown deployment status '{}'",
                deployment_status_str
            ))
        })?,
        last_deployed_at: row.get("last_deployed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn content_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ContentItem, AppError> {
    let body_str: String = row.get("body");
    let visible: i32 = row.get("visible");
    let body: ContentBody = serde_json::from_str(&body_str)
        .map_err(|e| AppError::Database(format!("Corrupt content body: {}", e)))?;

    Ok(ContentItem {
        id: row.get("id"),
        site_id: row.get("site_id"),
        section: row.get("section"),
        body,
        order: row.get("sort_order"),
        visible: visible != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn asset_from_row(row: &sqlx::sqlite::SqliteRow) -> Asset {
    let kind_str: String = row.get("kind");
    Asset {
        id: row.get("id"),
        site_id: row.get("site_id"),
        kind: AssetKind::from_str(&kind_str).unwrap_or(AssetKind::Document),
        url: row.get("url"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size: row.get("size"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn card_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CardManifest, AppError> {
    let manifest_str: String = row.get("manifest");
    let active: i32 = row.get("active");
    let manifest: CardManifestBody = serde_json::from_str(&manifest_str)
        .map_err(|e| AppError::Database(format!("Corrupt card manifest: {}", e)))?;

    Ok(CardManifest {
        id: row.get("id"),
        site_id: row.get("site_id"),
        manifest,
        active: active != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn template_from_row(row: &sqlx::sqlite::SqliteRow) -> Template {
    Template {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn point_rule_from_row(row: &sqlx::sqlite::SqliteRow) -> PointRule {
    PointRule {
        id: row.get("id"),
        name: row.get("name"),
        points: row.get("points"),
        source: row.get("source"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn point_transaction_from_row(row: &sqlx::sqlite::SqliteRow) -> PointTransaction {
    let metadata_str: Option<String> = row.get("metadata");
    PointTransaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        delta: row.get("delta"),
        tx_type: row.get("tx_type"),
        source: row.get("source"),
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get("created_at"),
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Event, AppError> {
    let geofence_str: Option<String> = row.get("geofence");
    let geofence: Option<Geofence> = geofence_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| AppError::Database(format!("Corrupt geofence: {}", e)))?;

    Ok(Event {
        id: row.get("id"),
        name: row.get("name"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        location: row.get("location"),
        geofence,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn checkin_from_row(row: &sqlx::sqlite::SqliteRow) -> EventCheckIn {
    EventCheckIn {
        id: row.get("id"),
        event_id: row.get("event_id"),
        user_id: row.get("user_id"),
        checked_in_at: row.get("checked_in_at"),
        lat: row.get("lat"),
        lng: row.get("lng"),
        points_awarded: row.get("points_awarded"),
    }
}
