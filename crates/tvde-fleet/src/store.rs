//! Document collections backing every tenant-scoped record.
//!
//! Production deployments plug a document database behind [`Collection`]; the
//! in-memory implementation is used by the CLI, the demo server and the tests.

use std::sync::{Arc, Mutex, MutexGuard};

/// A stored document. Every record belongs to exactly one partner (tenant).
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn partner_id(&self) -> &str;
}

/// Storage abstraction so services can be exercised in isolation.
pub trait Collection<T: Record>: Send + Sync {
    fn insert(&self, record: T) -> Result<T, RepositoryError>;
    fn update(&self, record: T) -> Result<(), RepositoryError>;
    fn get(&self, id: &str) -> Result<Option<T>, RepositoryError>;
    fn list(&self, partner_id: &str) -> Result<Vec<T>, RepositoryError>;
    fn all(&self) -> Result<Vec<T>, RepositoryError>;
    fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    /// Tenant-scoped lookup: records of other partners are invisible.
    fn get_for(&self, partner_id: &str, id: &str) -> Result<Option<T>, RepositoryError> {
        Ok(self
            .get(id)?
            .filter(|record| record.partner_id() == partner_id))
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Insertion-ordered collection guarded by a mutex.
#[derive(Debug)]
pub struct MemoryCollection<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Record> MemoryCollection<T> {
    pub fn shared() -> Arc<dyn Collection<T>> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<T>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("collection mutex poisoned".to_string()))
    }
}

impl<T: Record> Collection<T> for MemoryCollection<T> {
    fn insert(&self, record: T) -> Result<T, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.iter().any(|existing| existing.id() == record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn update(&self, record: T) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.iter_mut().find(|existing| existing.id() == record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn get(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.iter().find(|record| record.id() == id).cloned())
    }

    fn list(&self, partner_id: &str) -> Result<Vec<T>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .iter()
            .filter(|record| record.partner_id() == partner_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(self.lock()?.clone())
    }

    fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let mut guard = self.lock()?;
        let before = guard.len();
        guard.retain(|record| record.id() != id);
        Ok(guard.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        partner: String,
        body: &'static str,
    }

    impl Record for Note {
        fn id(&self) -> &str {
            &self.id
        }

        fn partner_id(&self) -> &str {
            &self.partner
        }
    }

    fn note(id: &str, partner: &str, body: &'static str) -> Note {
        Note {
            id: id.to_string(),
            partner: partner.to_string(),
            body,
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let collection = MemoryCollection::default();
        collection.insert(note("n1", "p1", "a")).expect("first insert");
        let error = collection
            .insert(note("n1", "p1", "b"))
            .expect_err("duplicate rejected");
        assert!(matches!(error, RepositoryError::Conflict));
    }

    #[test]
    fn scoped_lookup_hides_other_tenants() {
        let collection = MemoryCollection::default();
        collection.insert(note("n1", "p1", "a")).expect("insert");

        assert!(collection.get_for("p1", "n1").expect("lookup").is_some());
        assert!(collection.get_for("p2", "n1").expect("lookup").is_none());
        assert_eq!(collection.list("p2").expect("list").len(), 0);
    }

    #[test]
    fn update_and_delete_report_missing_records() {
        let collection = MemoryCollection::default();
        let error = collection
            .update(note("ghost", "p1", "a"))
            .expect_err("missing record");
        assert!(matches!(error, RepositoryError::NotFound));

        collection.insert(note("n1", "p1", "a")).expect("insert");
        collection.update(note("n1", "p1", "b")).expect("update");
        assert_eq!(collection.get("n1").expect("get").expect("present").body, "b");
        assert!(collection.delete("n1").expect("delete"));
        assert!(!collection.delete("n1").expect("second delete"));
    }
}
