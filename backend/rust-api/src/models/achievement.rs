use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Closed set of achievement rule types. Each carries its own progress
/// metric, dispatched explicitly in the achievement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    QuizScore,
    QuizCount,
    Streak,
    TopicMastery,
}

impl AchievementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementKind::QuizScore => "QUIZ_SCORE",
            AchievementKind::QuizCount => "QUIZ_COUNT",
            AchievementKind::Streak => "STREAK",
            AchievementKind::TopicMastery => "TOPIC_MASTERY",
        }
    }
}

/// Static catalog entry, authored by administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub threshold: i64,
    pub points: i64,
}

/// Unlock record, unique per (user, achievement). Once created it is never
/// updated or deleted: achievements are one-way state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievementUnlock {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub achievement_id: ObjectId,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    pub unlocked_at: DateTime<Utc>,
    /// Progress value at unlock time.
    pub progress: i64,
}

// ---------------------------------------------------------------------------
// Wire DTOs

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub threshold: i64,
    pub points: i64,
}

impl From<&Achievement> for AchievementView {
    fn from(achievement: &Achievement) -> Self {
        Self {
            id: achievement.id.to_hex(),
            name: achievement.name.clone(),
            description: achievement.description.clone(),
            icon: achievement.icon.clone(),
            kind: achievement.kind,
            threshold: achievement.threshold,
            points: achievement.points,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievementView {
    #[serde(flatten)]
    pub achievement: AchievementView,
    pub unlocked_at: DateTime<Utc>,
    pub progress: i64,
}

/// One catalog entry annotated with either the recorded unlock state or the
/// freshly computed live progress.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgressView {
    #[serde(flatten)]
    pub achievement: AchievementView,
    pub unlocked: bool,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
}
