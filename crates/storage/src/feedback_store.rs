use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, NotSet, QueryOrder, QuerySelect, Set};
use vanish_domain::model::FeedbackEntry;
use vanish_domain::storage::{FeedbackStore, StorageError, StorageResult};

use crate::entity::feedback;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl FeedbackStore for SeaOrmStorage {
    async fn add_feedback(
        &self,
        message: String,
        received_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let model = feedback::ActiveModel {
            id: NotSet,
            message: Set(message),
            received_at: Set(received_at),
        };
        feedback::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn recent_feedback(&self, limit: u64) -> StorageResult<Vec<FeedbackEntry>> {
        let rows = feedback::Entity::find()
            .order_by_desc(feedback::Column::Id)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(rows
            .into_iter()
            .map(|row| FeedbackEntry {
                message: row.message,
                received_at: row.received_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_storage;

    #[tokio::test]
    async fn lists_newest_first() {
        let storage = memory_storage().await;
        let now = Utc::now();
        for message in ["first", "second", "third"] {
            storage.add_feedback(message.to_string(), now).await.unwrap();
        }

        let recent = storage.recent_feedback(2).await.unwrap();
        let messages: Vec<_> = recent.iter().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second"]);
    }
}
