use anyhow::Context;
use mongodb::{bson::doc, options::IndexOptions, Client as MongoClient, Database, IndexModel};
use std::sync::Arc;

use crate::config::Config;

pub mod achievement_service;
pub mod attempt_service;
pub mod cooldown;
pub mod scoring;

pub use achievement_service::AchievementCatalog;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    /// Read-only achievement catalog, loaded once at startup and handed to
    /// the achievement engine by reference.
    pub achievements: Arc<AchievementCatalog>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        ensure_indexes(&mongo).await?;

        let achievements = Arc::new(AchievementCatalog::load(&mongo).await?);
        tracing::info!(
            "Achievement catalog loaded ({} entries)",
            achievements.len()
        );

        Ok(Self {
            config,
            mongo,
            achievements,
        })
    }
}

/// Creates the unique indexes the write paths rely on. Idempotent; safe to
/// run on every startup.
async fn ensure_indexes(db: &Database) -> anyhow::Result<()> {
    let unique = IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>("users")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create users.email index")?;

    db.collection::<mongodb::bson::Document>("topics")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create topics.name index")?;

    // The concurrency guard for attempt submission: at most one attempt may
    // succeed a given predecessor for the same (user, quiz) pair.
    db.collection::<mongodb::bson::Document>("results")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "quiz_id": 1, "previous_attempt_id": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create results chain index")?;

    // Supports the latest-attempt lookup (completed_at desc, _id desc).
    db.collection::<mongodb::bson::Document>("results")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "quiz_id": 1, "completed_at": -1 })
                .build(),
        )
        .await
        .context("Failed to create results lookup index")?;

    db.collection::<mongodb::bson::Document>("achievements")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create achievements.name index")?;

    // The idempotence guarantee for unlocks: a (user, achievement) pair can
    // exist at most once, no matter how often evaluation runs.
    db.collection::<mongodb::bson::Document>("user_achievements")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "achievement_id": 1 })
                .options(unique)
                .build(),
        )
        .await
        .context("Failed to create user_achievements pair index")?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}
