use anyhow::{Context, Result};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    Database,
};

use crate::config::Config;
use crate::models::achievement::CATALOGUE;
use crate::models::user::UserRole;
use crate::services::auth_service::{normalize_email, AuthService};
use crate::services::{ACHIEVEMENTS, USERS};

/// Upserts the fixed achievement catalogue by name.
pub async fn seed_achievements(mongo: &Database) -> Result<()> {
    let collection = mongo.collection::<Document>(ACHIEVEMENTS);

    for definition in CATALOGUE.iter() {
        collection
            .update_one(
                doc! { "name": definition.name },
                doc! {
                    "$set": {
                        "description": definition.description,
                        "icon": definition.icon,
                        "requirement": definition.requirement,
                    },
                    "$setOnInsert": { "created_at": BsonDateTime::now() },
                },
            )
            .upsert(true)
            .await
            .with_context(|| format!("Failed to seed achievement {}", definition.name))?;
    }

    tracing::debug!(count = CATALOGUE.len(), "Achievement catalogue seeded");
    Ok(())
}

/// Creates the configured administrator once. Existing accounts are never touched.
pub async fn seed_admin(config: &Config, mongo: &Database) -> Result<()> {
    let Some(seed) = &config.admin_seed else {
        tracing::debug!("No admin seed configured, skipping bootstrap");
        return Ok(());
    };

    let email = normalize_email(&seed.email);
    let now = BsonDateTime::now();
    let admin = doc! {
        "email": &email,
        "password_hash": AuthService::hash_password(&seed.password)?,
        "name": &seed.name,
        "role": UserRole::Admin.as_str(),
        "is_active": true,
        "created_at": now,
        "updated_at": now,
    };

    let update = mongo
        .collection::<Document>(USERS)
        .update_one(doc! { "email": &email }, doc! { "$setOnInsert": admin })
        .upsert(true)
        .await
        .context("Failed to insert admin user")?;

    if update.upserted_id.is_some() {
        tracing::info!(email = %email, "Admin user created");
    } else {
        tracing::info!(email = %email, "Admin user already exists, seed skipped");
    }
    Ok(())
}

pub async fn bootstrap(config: &Config, mongo: &Database) -> Result<()> {
    seed_achievements(mongo).await?;
    seed_admin(config, mongo).await
}
