//! # Dealer Repository
//!
//! Credential store for registered dealers. Partner secret keys are
//! encrypted with AES-256-GCM before they touch the database; the plaintext
//! only exists again inside the executor while a job for that dealer runs.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::crypto::{CryptoKey, encrypt_dealer_secret};
use crate::error::SyncError;
use crate::models::dealer::{self, Entity as Dealer};

/// Fields required to register a dealer.
#[derive(Debug, Clone)]
pub struct NewDealer {
    pub code: String,
    pub name: String,
    pub api_key: String,
    pub secret_key: String,
    pub active: bool,
}

/// Partial dealer update. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct DealerChanges {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub active: Option<bool>,
}

impl DealerChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.api_key.is_none()
            && self.secret_key.is_none()
            && self.active.is_none()
    }
}

/// Repository for dealer database operations
pub struct DealerRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DealerRepository<'a> {
    /// Create a new DealerRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Register a dealer, encrypting its partner secret before storage.
    pub async fn create(
        &self,
        crypto_key: &CryptoKey,
        new: NewDealer,
    ) -> Result<dealer::Model, SyncError> {
        require_non_empty("code", &new.code)?;
        require_non_empty("name", &new.name)?;
        require_non_empty("api_key", &new.api_key)?;
        require_non_empty("secret_key", &new.secret_key)?;

        let dealer_id = Uuid::new_v4();
        let ciphertext = encrypt_dealer_secret(crypto_key, dealer_id, new.secret_key.trim())?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let dealer = dealer::ActiveModel {
            id: Set(dealer_id),
            code: Set(new.code.trim().to_string()),
            name: Set(new.name.trim().to_string()),
            api_key: Set(new.api_key.trim().to_string()),
            secret_key_ciphertext: Set(ciphertext),
            active: Set(new.active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await?;

        Ok(dealer)
    }

    /// Apply a partial update, re-encrypting the secret when it changes.
    pub async fn update(
        &self,
        crypto_key: &CryptoKey,
        dealer_id: Uuid,
        changes: DealerChanges,
    ) -> Result<dealer::Model, SyncError> {
        if changes.is_empty() {
            return Err(SyncError::Validation(
                "at least one field must be provided".to_string(),
            ));
        }

        let dealer = Dealer::find_by_id(dealer_id)
            .one(self.db)
            .await?
            .ok_or(SyncError::UnknownDealer(dealer_id))?;

        let mut active_model: dealer::ActiveModel = dealer.into();
        if let Some(name) = changes.name {
            require_non_empty("name", &name)?;
            active_model.name = Set(name.trim().to_string());
        }
        if let Some(api_key) = changes.api_key {
            require_non_empty("api_key", &api_key)?;
            active_model.api_key = Set(api_key.trim().to_string());
        }
        if let Some(secret_key) = changes.secret_key {
            require_non_empty("secret_key", &secret_key)?;
            let ciphertext = encrypt_dealer_secret(crypto_key, dealer_id, secret_key.trim())?;
            active_model.secret_key_ciphertext = Set(ciphertext);
        }
        if let Some(active) = changes.active {
            active_model.active = Set(active);
        }
        active_model.updated_at = Set(Utc::now().into());

        Ok(active_model.update(self.db).await?)
    }

    /// Fetch one dealer by id.
    pub async fn get(&self, dealer_id: Uuid) -> Result<Option<dealer::Model>, SyncError> {
        Ok(Dealer::find_by_id(dealer_id).one(self.db).await?)
    }

    /// List all dealers ordered by code.
    pub async fn list(&self) -> Result<Vec<dealer::Model>, SyncError> {
        Ok(Dealer::find()
            .order_by_asc(dealer::Column::Code)
            .all(self.db)
            .await?)
    }

    /// List dealers eligible for scheduled syncs.
    pub async fn list_active(&self) -> Result<Vec<dealer::Model>, SyncError> {
        Ok(Dealer::find()
            .filter(dealer::Column::Active.eq(true))
            .order_by_asc(dealer::Column::Code)
            .all(self.db)
            .await?)
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decrypt_dealer_secret;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        db
    }

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    fn sample_dealer() -> NewDealer {
        NewDealer {
            code: "DLR001".to_string(),
            name: "Mitra Motor".to_string(),
            api_key: "api-key-1".to_string(),
            secret_key: "super-secret".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn create_encrypts_the_secret() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);
        let key = test_key();

        let dealer = repo.create(&key, sample_dealer()).await.unwrap();

        assert_eq!(dealer.code, "DLR001");
        assert_ne!(dealer.secret_key_ciphertext, b"super-secret".to_vec());
        let decrypted = decrypt_dealer_secret(&key, &dealer).unwrap();
        assert_eq!(decrypted, "super-secret");
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);

        let result = repo
            .create(
                &test_key(),
                NewDealer {
                    code: "   ".to_string(),
                    ..sample_dealer()
                },
            )
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected_by_the_database() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);
        let key = test_key();

        repo.create(&key, sample_dealer()).await.unwrap();
        let result = repo.create(&key, sample_dealer()).await;

        assert!(matches!(result, Err(SyncError::Db(_))));
    }

    #[tokio::test]
    async fn update_rotates_the_secret() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);
        let key = test_key();

        let dealer = repo.create(&key, sample_dealer()).await.unwrap();
        let old_ciphertext = dealer.secret_key_ciphertext.clone();

        let updated = repo
            .update(
                &key,
                dealer.id,
                DealerChanges {
                    secret_key: Some("rotated-secret".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_ne!(updated.secret_key_ciphertext, old_ciphertext);
        assert_eq!(
            decrypt_dealer_secret(&key, &updated).unwrap(),
            "rotated-secret"
        );
    }

    #[tokio::test]
    async fn deactivation_is_persisted() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);
        let key = test_key();

        let dealer = repo.create(&key, sample_dealer()).await.unwrap();
        let updated = repo
            .update(
                &key,
                dealer.id,
                DealerChanges {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.active);
        assert!(repo.list_active().await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);
        let key = test_key();

        let dealer = repo.create(&key, sample_dealer()).await.unwrap();
        let result = repo
            .update(&key, dealer.id, DealerChanges::default())
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_dealer_update_is_an_explicit_error() {
        let db = setup_db().await;
        let repo = DealerRepository::new(&db);

        let result = repo
            .update(
                &test_key(),
                Uuid::new_v4(),
                DealerChanges {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(SyncError::UnknownDealer(_))));
    }
}
