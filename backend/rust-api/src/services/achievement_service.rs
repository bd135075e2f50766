use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};

use crate::error::{is_duplicate_key, ApiError};
use crate::metrics::ACHIEVEMENTS_UNLOCKED_TOTAL;
use crate::models::achievement::{Achievement, AchievementKind, UserAchievementUnlock};
use crate::models::attempt::AttemptRecord;

/// A quiz counts toward TOPIC_MASTERY when the user's average score across
/// all attempts at it reaches this value.
pub const MASTERY_AVERAGE_SCORE: f64 = 90.0;

/// The two defensible readings of "streak".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakRule {
    /// Length of the most-recent run of attempts sharing one calendar date.
    /// Two quizzes taken minutes apart count as a streak of two.
    SameDayRun,
    /// Number of consecutive distinct UTC calendar days with at least one
    /// attempt, walked back from the most recent attempt day.
    DistinctDays,
}

/// Active streak semantic for the STREAK achievement type.
pub const STREAK_RULE: StreakRule = StreakRule::DistinctDays;

/// Read-only achievement catalog, loaded once at startup.
pub struct AchievementCatalog {
    entries: Vec<Achievement>,
}

impl AchievementCatalog {
    pub async fn load(db: &Database) -> anyhow::Result<Self> {
        let collection: Collection<Achievement> = db.collection("achievements");
        let entries = collection
            .find(doc! {})
            .await
            .context("Failed to query achievement catalog")?
            .try_collect()
            .await
            .context("Failed to read achievement catalog")?;
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<Achievement>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Achievement> {
        self.entries.iter()
    }

    pub fn find(&self, id: ObjectId) -> Option<&Achievement> {
        self.entries.iter().find(|a| a.id == id)
    }
}

/// Rule-based unlock evaluation over the persisted attempt history. Safe to
/// run repeatedly and concurrently for the same user: the unique
/// (user_id, achievement_id) index makes every unlock at-most-once.
pub struct AchievementService {
    mongo: Database,
    catalog: Arc<AchievementCatalog>,
}

impl AchievementService {
    pub fn new(mongo: Database, catalog: Arc<AchievementCatalog>) -> Self {
        Self { mongo, catalog }
    }

    fn results(&self) -> Collection<AttemptRecord> {
        self.mongo.collection("results")
    }

    fn unlocks(&self) -> Collection<UserAchievementUnlock> {
        self.mongo.collection("user_achievements")
    }

    /// Re-evaluates every rule in the catalog for the user and persists any
    /// newly-qualifying unlocks. Returns the achievements unlocked by this
    /// run (for notification); already-unlocked records are never touched.
    pub async fn evaluate_user(&self, user_id: ObjectId) -> Result<Vec<Achievement>, ApiError> {
        let already_unlocked: HashSet<ObjectId> = self
            .unlocked_for(user_id)
            .await?
            .into_iter()
            .map(|unlock| unlock.achievement_id)
            .collect();

        let mut newly_unlocked = Vec::new();

        for achievement in self.catalog.iter() {
            if already_unlocked.contains(&achievement.id) {
                continue;
            }

            let progress = self.progress(user_id, achievement.kind).await?;
            if progress < achievement.threshold {
                continue;
            }

            let unlock = UserAchievementUnlock {
                id: ObjectId::new(),
                user_id,
                achievement_id: achievement.id,
                unlocked_at: Utc::now(),
                progress,
            };

            match self.unlocks().insert_one(&unlock).await {
                Ok(_) => {
                    ACHIEVEMENTS_UNLOCKED_TOTAL
                        .with_label_values(&[achievement.kind.as_str()])
                        .inc();
                    tracing::info!(
                        "Achievement unlocked: user={}, achievement={}, progress={}",
                        user_id,
                        achievement.name,
                        progress
                    );
                    newly_unlocked.push(achievement.clone());
                }
                // A concurrent evaluation got there first; the unlock exists,
                // which is all the contract asks for.
                Err(err) if is_duplicate_key(&err) => {
                    tracing::debug!(
                        "Achievement already unlocked concurrently: user={}, achievement={}",
                        user_id,
                        achievement.name
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(newly_unlocked)
    }

    /// Current progress of one rule type, computed live from the attempt
    /// history. Used both by unlock evaluation and the progress query, so
    /// all four types report uniformly.
    pub async fn progress(
        &self,
        user_id: ObjectId,
        kind: AchievementKind,
    ) -> Result<i64, ApiError> {
        match kind {
            AchievementKind::QuizScore => self.highest_score(user_id).await,
            AchievementKind::QuizCount => self.attempt_count(user_id).await,
            AchievementKind::Streak => self.current_streak(user_id).await,
            AchievementKind::TopicMastery => self.mastered_quiz_count(user_id).await,
        }
    }

    /// Unlock records for the user, most recently unlocked first.
    pub async fn unlocked_for(
        &self,
        user_id: ObjectId,
    ) -> Result<Vec<UserAchievementUnlock>, ApiError> {
        let unlocks = self
            .unlocks()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "unlocked_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(unlocks)
    }

    async fn highest_score(&self, user_id: ObjectId) -> Result<i64, ApiError> {
        let best = self
            .results()
            .find_one(doc! { "user_id": user_id })
            .sort(doc! { "score": -1 })
            .await?;
        Ok(best.map(|attempt| attempt.score as i64).unwrap_or(0))
    }

    async fn attempt_count(&self, user_id: ObjectId) -> Result<i64, ApiError> {
        let count = self
            .results()
            .count_documents(doc! { "user_id": user_id })
            .await?;
        Ok(count as i64)
    }

    async fn current_streak(&self, user_id: ObjectId) -> Result<i64, ApiError> {
        let attempts: Vec<AttemptRecord> = self
            .results()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "completed_at": -1, "_id": -1 })
            .await?
            .try_collect()
            .await?;

        let days: Vec<NaiveDate> = attempts
            .iter()
            .map(|attempt| attempt.completed_at.date_naive())
            .collect();

        Ok(streak_length(&days, STREAK_RULE))
    }

    /// Distinct quizzes whose per-quiz average score reaches the mastery bar.
    async fn mastered_quiz_count(&self, user_id: ObjectId) -> Result<i64, ApiError> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! {
                "$group": {
                    "_id": "$quiz_id",
                    "avg_score": { "$avg": "$score" },
                }
            },
            doc! { "$match": { "avg_score": { "$gte": MASTERY_AVERAGE_SCORE } } },
            doc! { "$count": "mastered" },
        ];

        let mut cursor = self.results().aggregate(pipeline).await?;
        match cursor.try_next().await? {
            Some(row) => Ok(row.get_i32("mastered").unwrap_or(0) as i64),
            None => Ok(0),
        }
    }
}

/// Streak over attempt days sorted most-recent first.
fn streak_length(days_desc: &[NaiveDate], rule: StreakRule) -> i64 {
    let Some(&most_recent) = days_desc.first() else {
        return 0;
    };

    match rule {
        StreakRule::SameDayRun => {
            days_desc.iter().take_while(|&&d| d == most_recent).count() as i64
        }
        StreakRule::DistinctDays => {
            let mut streak = 1;
            let mut current = most_recent;
            for &day in &days_desc[1..] {
                if day == current {
                    continue;
                }
                if (current - day).num_days() == 1 {
                    streak += 1;
                    current = day;
                } else {
                    break;
                }
            }
            streak
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_history_has_no_streak() {
        assert_eq!(streak_length(&[], StreakRule::DistinctDays), 0);
        assert_eq!(streak_length(&[], StreakRule::SameDayRun), 0);
    }

    #[test]
    fn distinct_days_counts_consecutive_days() {
        let days = vec![day(2025, 6, 3), day(2025, 6, 2), day(2025, 6, 1)];
        assert_eq!(streak_length(&days, StreakRule::DistinctDays), 3);
    }

    #[test]
    fn distinct_days_dedupes_same_day_attempts() {
        // Three attempts today and one yesterday is a two-day streak.
        let days = vec![
            day(2025, 6, 3),
            day(2025, 6, 3),
            day(2025, 6, 3),
            day(2025, 6, 2),
        ];
        assert_eq!(streak_length(&days, StreakRule::DistinctDays), 2);
    }

    #[test]
    fn distinct_days_breaks_on_gap() {
        let days = vec![day(2025, 6, 3), day(2025, 6, 2), day(2025, 5, 30)];
        assert_eq!(streak_length(&days, StreakRule::DistinctDays), 2);
    }

    #[test]
    fn single_day_is_streak_of_one() {
        let days = vec![day(2025, 6, 3), day(2025, 6, 3)];
        assert_eq!(streak_length(&days, StreakRule::DistinctDays), 1);
    }

    #[test]
    fn same_day_run_counts_attempts_not_days() {
        let days = vec![
            day(2025, 6, 3),
            day(2025, 6, 3),
            day(2025, 6, 3),
            day(2025, 6, 2),
        ];
        assert_eq!(streak_length(&days, StreakRule::SameDayRun), 3);
    }

    #[test]
    fn same_day_run_stops_at_first_date_change() {
        let days = vec![day(2025, 6, 3), day(2025, 6, 2), day(2025, 6, 2)];
        assert_eq!(streak_length(&days, StreakRule::SameDayRun), 1);
    }

    #[test]
    fn active_rule_is_distinct_days() {
        assert_eq!(STREAK_RULE, StreakRule::DistinctDays);
    }
}
