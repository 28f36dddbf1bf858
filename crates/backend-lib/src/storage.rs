// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage abstraction with in-memory and flat-file implementations.
//!
//! Uniqueness of account emails and matricules and of establishment codes is
//! enforced here, under the same lock as the insert, so two concurrent
//! registrations for one email cannot both succeed.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use scholarflow_common::AccountId;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs as tokio_fs, sync::Mutex};

use crate::error::AppError;
use crate::models::{Account, AccountPatch, Establishment, EstablishmentPatch, NewAccount};

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new account; fails with `DuplicateResource` on email or matricule collision
    async fn insert_account(&self, account: NewAccount) -> Result<Account, AppError>;

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, AppError>;

    /// Case-insensitive lookup
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    /// Apply a partial update atomically and return the new record
    async fn update_account(&self, id: AccountId, patch: &AccountPatch) -> Result<Account, AppError>;

    /// Insert a new establishment; fails with `DuplicateResource` if the code exists
    async fn insert_establishment(&self, establishment: Establishment) -> Result<Establishment, AppError>;

    async fn establishment(&self, code: &str) -> Result<Option<Establishment>, AppError>;

    async fn list_establishments(&self) -> Result<Vec<Establishment>, AppError>;

    /// Apply a patch to an existing establishment in one step; `NotFound` if absent
    async fn update_establishment(&self, code: &str, patch: &EstablishmentPatch) -> Result<Establishment, AppError>;

    /// Returns whether a record was removed
    async fn delete_establishment(&self, code: &str) -> Result<bool, AppError>;
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Default)]
struct Tables {
    next_account_id: AccountId,
    accounts: BTreeMap<AccountId, Account>,
    emails: HashMap<String, AccountId>,
    matricules: HashMap<String, AccountId>,
    establishments: BTreeMap<String, Establishment>,
}

impl Tables {
    fn check_unique(&self, email: &str, matricule: &str, except: Option<AccountId>) -> Result<(), AppError> {
        if let Some(owner) = self.emails.get(&email_key(email)) {
            if Some(*owner) != except {
                return Err(AppError::DuplicateResource {
                    field: "email",
                    value: email.to_string(),
                });
            }
        }
        if let Some(owner) = self.matricules.get(matricule) {
            if Some(*owner) != except {
                return Err(AppError::DuplicateResource {
                    field: "matricule",
                    value: matricule.to_string(),
                });
            }
        }
        Ok(())
    }

    fn put_account(&mut self, account: Account) {
        if let Some(previous) = self.accounts.remove(&account.id) {
            self.emails.remove(&email_key(&previous.email));
            self.matricules.remove(&previous.matricule);
        }
        self.emails.insert(email_key(&account.email), account.id);
        self.matricules.insert(account.matricule.clone(), account.id);
        self.next_account_id = self.next_account_id.max(account.id);
        self.accounts.insert(account.id, account);
    }
}

/// In-memory storage; every mutation happens under one write lock
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_account_sync(&self, new: NewAccount) -> Result<Account, AppError> {
        let mut tables = self.tables.write();
        tables.check_unique(&new.email, &new.matricule, None)?;

        let id = tables.next_account_id + 1;
        let account = new.into_account(id, Utc::now());
        tables.put_account(account.clone());
        Ok(account)
    }

    /// Returns the record before and after the patch
    fn update_account_sync(&self, id: AccountId, patch: &AccountPatch) -> Result<(Account, Account), AppError> {
        let mut tables = self.tables.write();
        let before = tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;

        let mut after = before.clone();
        patch.apply(&mut after, Utc::now());
        tables.put_account(after.clone());
        Ok((before, after))
    }

    /// Insert or overwrite a full record, keeping indexes consistent
    fn restore_account(&self, account: Account) -> Result<(), AppError> {
        let mut tables = self.tables.write();
        tables.check_unique(&account.email, &account.matricule, Some(account.id))?;
        tables.put_account(account);
        Ok(())
    }

    fn remove_account(&self, id: AccountId) {
        let mut tables = self.tables.write();
        if let Some(account) = tables.accounts.remove(&id) {
            tables.emails.remove(&email_key(&account.email));
            tables.matricules.remove(&account.matricule);
        }
    }

    fn insert_establishment_sync(&self, establishment: Establishment) -> Result<Establishment, AppError> {
        let mut tables = self.tables.write();
        if tables.establishments.contains_key(&establishment.code) {
            return Err(AppError::DuplicateResource {
                field: "code",
                value: establishment.code,
            });
        }
        tables
            .establishments
            .insert(establishment.code.clone(), establishment.clone());
        Ok(establishment)
    }

    /// Returns the previous record
    /// Returns the record before and after the patch
    fn update_establishment_sync(
        &self,
        code: &str,
        patch: &EstablishmentPatch,
    ) -> Result<(Establishment, Establishment), AppError> {
        let mut tables = self.tables.write();
        let slot = tables
            .establishments
            .get_mut(code)
            .ok_or_else(|| AppError::NotFound(format!("establishment {code}")))?;
        let before = slot.clone();
        patch.apply(slot);
        Ok((before, slot.clone()))
    }

    fn restore_establishment(&self, establishment: Establishment) {
        self.tables
            .write()
            .establishments
            .insert(establishment.code.clone(), establishment);
    }

    fn delete_establishment_sync(&self, code: &str) -> Option<Establishment> {
        self.tables.write().establishments.remove(code)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_account(&self, account: NewAccount) -> Result<Account, AppError> {
        self.insert_account_sync(account)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, AppError> {
        Ok(self.tables.read().accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .emails
            .get(&email_key(email))
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn update_account(&self, id: AccountId, patch: &AccountPatch) -> Result<Account, AppError> {
        self.update_account_sync(id, patch).map(|(_, after)| after)
    }

    async fn insert_establishment(&self, establishment: Establishment) -> Result<Establishment, AppError> {
        self.insert_establishment_sync(establishment)
    }

    async fn establishment(&self, code: &str) -> Result<Option<Establishment>, AppError> {
        Ok(self.tables.read().establishments.get(code).cloned())
    }

    async fn list_establishments(&self) -> Result<Vec<Establishment>, AppError> {
        Ok(self.tables.read().establishments.values().cloned().collect())
    }

    async fn update_establishment(&self, code: &str, patch: &EstablishmentPatch) -> Result<Establishment, AppError> {
        self.update_establishment_sync(code, patch).map(|(_, after)| after)
    }

    async fn delete_establishment(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.delete_establishment_sync(code).is_some())
    }
}

/// Flat-file implementation of the Storage trait.
///
/// One pretty-printed JSON file per record under `accounts/` and
/// `establishments/`. Records are loaded into a [`MemoryStorage`] index at
/// start-up and written through on every mutation; a failed write rolls the
/// index back.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    index: MemoryStorage,
    writer: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("accounts"))?;
        fs::create_dir_all(root.join("establishments"))?;

        let index = MemoryStorage::new();
        for account in load_records::<Account>(&root.join("accounts"))? {
            index
                .restore_account(account)
                .map_err(|e| anyhow::anyhow!("corrupt account store: {e}"))?;
        }
        for establishment in load_records::<Establishment>(&root.join("establishments"))? {
            index.restore_establishment(establishment);
        }

        tracing::info!(root = %root.display(), "flat-file storage loaded");

        Ok(Self {
            root,
            index,
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn account_path(&self, id: AccountId) -> PathBuf {
        self.root.join("accounts").join(format!("{id}.json"))
    }

    fn establishment_path(&self, code: &str) -> PathBuf {
        self.root.join("establishments").join(format!("{code}.json"))
    }
}

fn load_records<T: DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        records.push(serde_json::from_str(&content)?);
    }
    Ok(records)
}

/// Write via a temporary file and rename so readers never see a partial record
async fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    tokio_fs::write(&tmp, json).await?;
    tokio_fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn insert_account(&self, account: NewAccount) -> Result<Account, AppError> {
        let _guard = self.writer.lock().await;
        let account = self.index.insert_account_sync(account)?;

        if let Err(e) = write_record(&self.account_path(account.id), &account).await {
            self.index.remove_account(account.id);
            return Err(e);
        }
        Ok(account)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, AppError> {
        self.index.account_by_id(id).await
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.index.account_by_email(email).await
    }

    async fn update_account(&self, id: AccountId, patch: &AccountPatch) -> Result<Account, AppError> {
        let _guard = self.writer.lock().await;
        let (before, after) = self.index.update_account_sync(id, patch)?;

        if let Err(e) = write_record(&self.account_path(id), &after).await {
            self.index.restore_account(before)?;
            return Err(e);
        }
        Ok(after)
    }

    async fn insert_establishment(&self, establishment: Establishment) -> Result<Establishment, AppError> {
        let _guard = self.writer.lock().await;
        let establishment = self.index.insert_establishment_sync(establishment)?;

        if let Err(e) = write_record(&self.establishment_path(&establishment.code), &establishment).await {
            self.index.delete_establishment_sync(&establishment.code);
            return Err(e);
        }
        Ok(establishment)
    }

    async fn establishment(&self, code: &str) -> Result<Option<Establishment>, AppError> {
        self.index.establishment(code).await
    }

    async fn list_establishments(&self) -> Result<Vec<Establishment>, AppError> {
        self.index.list_establishments().await
    }

    async fn update_establishment(&self, code: &str, patch: &EstablishmentPatch) -> Result<Establishment, AppError> {
        let _guard = self.writer.lock().await;
        let (before, after) = self.index.update_establishment_sync(code, patch)?;

        if let Err(e) = write_record(&self.establishment_path(code), &after).await {
            self.index.restore_establishment(before);
            return Err(e);
        }
        Ok(after)
    }

    async fn delete_establishment(&self, code: &str) -> Result<bool, AppError> {
        let _guard = self.writer.lock().await;
        let Some(removed) = self.index.delete_establishment_sync(code) else {
            return Ok(false);
        };

        match tokio_fs::remove_file(self.establishment_path(code)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => {
                self.index.restore_establishment(removed);
                Err(e.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarflow_common::{EstablishmentStatus, Role};

    pub(crate) fn new_account(email: &str, matricule: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            matricule: matricule.to_string(),
            password_hash: "hash".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            full_name: String::new(),
            role: Role::Learner,
            phone_number: None,
            is_verified: false,
            is_active: false,
            is_staff: false,
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let storage = MemoryStorage::new();
        let a = storage.insert_account(new_account("a@x.com", "M1")).await.unwrap();
        let b = storage.insert_account(new_account("b@x.com", "M2")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_case_insensitive() {
        let storage = MemoryStorage::new();
        storage.insert_account(new_account("a@x.com", "M1")).await.unwrap();

        let err = storage
            .insert_account(new_account("A@X.com", "M2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateResource { field: "email", .. }));

        let found = storage.account_by_email("A@x.COM").await.unwrap();
        assert_eq!(found.unwrap().matricule, "M1");
    }

    #[tokio::test]
    async fn test_matricule_uniqueness() {
        let storage = MemoryStorage::new();
        storage.insert_account(new_account("a@x.com", "M1")).await.unwrap();

        let err = storage
            .insert_account(new_account("b@x.com", "M1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateResource { field: "matricule", .. }));
        assert!(storage.account_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let storage = MemoryStorage::new();
        let err = storage
            .update_account(42, &AccountPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_establishment_crud() {
        let storage = MemoryStorage::new();
        let school = Establishment {
            code: "LYC-001".to_string(),
            name: "Lycee".to_string(),
            address: None,
            created_at: None,
            status: EstablishmentStatus::Active,
        };

        storage.insert_establishment(school.clone()).await.unwrap();
        assert!(matches!(
            storage.insert_establishment(school.clone()).await,
            Err(AppError::DuplicateResource { field: "code", .. })
        ));

        let rename = EstablishmentPatch {
            name: Some("Lycee Bilingue".to_string()),
            ..Default::default()
        };
        storage.update_establishment("LYC-001", &rename).await.unwrap();
        assert_eq!(
            storage.establishment("LYC-001").await.unwrap().unwrap().name,
            "Lycee Bilingue"
        );
        assert!(matches!(
            storage.update_establishment("NOPE", &rename).await,
            Err(AppError::NotFound(_))
        ));

        assert!(storage.delete_establishment("LYC-001").await.unwrap());
        assert!(!storage.delete_establishment("LYC-001").await.unwrap());
        assert!(storage.list_establishments().await.unwrap().is_empty());
    }
}
