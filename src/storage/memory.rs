//! In-memory storage implementation.
//!
//! Holds a whole profile sheet in a vector. This is what the server and the batch
//! tools use when they are pointed at a CSV file instead of a database.

use super::{ProfileStorage, StorageError, StorageResult};
use crate::models::Profile;
use async_trait::async_trait;
use tracing::warn;

/// Vector-backed profile storage.
///
/// Ids are assigned sequentially from 1 in insertion order. Profiles that already
/// carry an id keep it; an id that is already taken is rejected like a primary
/// key violation.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    profiles: Vec<Profile>,
    next_id: i64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            profiles: Vec::new(),
            next_id: 1,
        }
    }

    /// Build a storage from already-loaded profiles.
    ///
    /// Rejected profiles (duplicate key or id) are logged and skipped; the first
    /// occurrence wins.
    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        let mut storage = Self::new();
        let mut skipped = 0;
        for profile in profiles {
            let name = profile.name.clone();
            if let Err(e) = storage.insert(profile) {
                warn!("Skipping profile '{}': {}", name, e);
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(
                "{} profiles skipped, {} kept",
                skipped,
                storage.profiles.len()
            );
        }
        storage
    }

    fn insert(&mut self, mut profile: Profile) -> StorageResult<i64> {
        let key = profile.match_key();
        if self.profiles.iter().any(|p| p.match_key() == key) {
            return Err(StorageError::DuplicateEntry(format!(
                "'{}' already stored",
                profile.name
            )));
        }
        let id = match profile.id {
            Some(id) if self.profiles.iter().any(|p| p.id == Some(id)) => {
                return Err(StorageError::DuplicateEntry(format!(
                    "id {} already used, cannot store '{}'",
                    id, profile.name
                )));
            }
            Some(id) => id,
            None => self.next_id,
        };
        self.next_id = self.next_id.max(id + 1);
        profile.id = Some(id);
        self.profiles.push(profile);
        Ok(id)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStorage for MemoryStorage {
    async fn initialize(&mut self) -> StorageResult<()> {
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> StorageResult<i64> {
        self.insert(profile.clone())
    }

    async fn exists_by_key(&self, match_key: &str) -> StorageResult<bool> {
        Ok(self.profiles.iter().any(|p| p.match_key() == match_key))
    }

    async fn get_all_profiles(&self) -> StorageResult<Vec<Profile>> {
        Ok(self.profiles.clone())
    }

    async fn get_profile_by_id(&self, id: i64) -> StorageResult<Profile> {
        self.profiles
            .iter()
            .find(|p| p.id == Some(id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Profile {} not found", id)))
    }

    async fn count_profiles(&self) -> StorageResult<usize> {
        Ok(self.profiles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buddy(name: &str, destination: &str) -> Profile {
        Profile {
            destination: Some(destination.to_string()),
            ..Profile::named(name)
        }
    }

    #[tokio::test]
    async fn test_ids_assigned_in_order() {
        let mut storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        assert_eq!(storage.insert_profile(&buddy("Test One", "Los Angeles")).await.unwrap(), 1);
        assert_eq!(storage.insert_profile(&buddy("Alpha Two", "New Delhi")).await.unwrap(), 2);

        let all = storage.get_all_profiles().await.unwrap();
        assert_eq!(all[0].name, "Test One");
        assert_eq!(all[1].id, Some(2));
        assert_eq!(storage.get_profile_by_id(2).await.unwrap().name, "Alpha Two");
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let mut storage = MemoryStorage::new();
        storage.insert_profile(&buddy("Test One", "Los Angeles")).await.unwrap();
        let err = storage
            .insert_profile(&buddy("test one", "los angeles"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntry(_)));
        assert!(storage.exists_by_key(&buddy("TEST ONE", "Los Angeles").match_key()).await.unwrap());
        assert_eq!(storage.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_profiles_keeps_explicit_ids() {
        let mut first = buddy("Alpha Five", "Berlin");
        first.id = Some(10);
        let storage = MemoryStorage::from_profiles(vec![first, buddy("Test Twelve", "Berlin")]);
        let all = storage.get_all_profiles().await.unwrap();
        assert_eq!(all[0].id, Some(10));
        assert_eq!(all[1].id, Some(11));
    }

    #[tokio::test]
    async fn test_explicit_id_collision_rejected() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.insert_profile(&buddy("Test One", "Los Angeles")).await.unwrap(), 1);

        let mut clash = buddy("Alpha Two", "New Delhi");
        clash.id = Some(1);
        let err = storage.insert_profile(&clash).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntry(_)));
        assert_eq!(storage.get_profile_by_id(1).await.unwrap().name, "Test One");
        assert_eq!(storage.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_profiles_skips_rejected_rows() {
        let mut clash = buddy("Alpha Two", "New Delhi");
        clash.id = Some(1);
        let storage = MemoryStorage::from_profiles(vec![
            buddy("Test One", "Los Angeles"),
            clash,
            buddy("TEST ONE", "los angeles"),
            buddy("Test Nine", "London"),
        ]);

        let all = storage.get_all_profiles().await.unwrap();
        let ids: Vec<Option<i64>> = all.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
        assert_eq!(all[1].name, "Test Nine");
    }

    #[tokio::test]
    async fn test_missing_id() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get_profile_by_id(7).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
