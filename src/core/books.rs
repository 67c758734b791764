use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use crate::{
    book::{BookDraft, BookPatch, BookRecord},
    types::{BookId, BookStatus},
    validate,
};

use super::store::StoreError;

/// Book records in insertion order.
#[derive(Debug, Clone, Default)]
pub struct BookTable {
    records: HashMap<BookId, BookRecord>,
    order: Vec<BookId>,
    next_id: BookId,
}

impl BookTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a table from records in insertion order.
    pub fn from_records(records: Vec<BookRecord>, next_id: BookId) -> Result<Self, StoreError> {
        let mut table = Self {
            next_id,
            ..Self::default()
        };
        for rec in records {
            table.insert(rec)?;
        }
        Ok(table)
    }

    /// Validates `draft` and inserts a new available book.
    pub fn create(&mut self, draft: BookDraft, now: DateTime<Utc>) -> Result<BookRecord, StoreError> {
        validate::validate_draft(&draft).map_err(StoreError::Validation)?;
        let rec = BookRecord::from_draft(self.next_id, draft, now);
        self.insert(rec.clone())?;
        Ok(rec)
    }

    /// Inserts a materialized record, keeping `next_id` ahead of it.
    pub fn insert(&mut self, rec: BookRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&rec.id) {
            return Err(StoreError::AlreadyExists(rec.id));
        }
        self.next_id = self.next_id.max(rec.id.saturating_add(1));
        self.order.push(rec.id);
        self.records.insert(rec.id, rec);
        Ok(())
    }

    /// Validates `patch` and merges it into an existing book.
    pub fn update(
        &mut self,
        id: BookId,
        patch: &BookPatch,
        now: DateTime<Utc>,
    ) -> Result<BookRecord, StoreError> {
        self.require(id)?;
        validate::validate_patch(patch).map_err(StoreError::Validation)?;
        self.apply_patch(id, patch, now)
    }

    /// Merges `patch` without validation; used by replay.
    pub fn apply_patch(
        &mut self,
        id: BookId,
        patch: &BookPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<BookRecord, StoreError> {
        let rec = self.get_mut(id)?;
        patch.apply_to(rec);
        rec.updated_at = updated_at;
        Ok(rec.clone())
    }

    pub fn delete(&mut self, id: BookId) -> Result<BookRecord, StoreError> {
        let rec = self.records.remove(&id).ok_or(StoreError::BookNotFound(id))?;
        self.order.retain(|x| *x != id);
        Ok(rec)
    }

    pub fn get(&self, id: BookId) -> Option<&BookRecord> {
        self.records.get(&id)
    }

    pub fn require(&self, id: BookId) -> Result<&BookRecord, StoreError> {
        self.records.get(&id).ok_or(StoreError::BookNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: BookId) -> Result<&mut BookRecord, StoreError> {
        self.records.get_mut(&id).ok_or(StoreError::BookNotFound(id))
    }

    /// All books in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BookRecord> + '_ {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn list(&self) -> Vec<&BookRecord> {
        self.iter().collect()
    }

    pub fn list_by_status(&self, status: BookStatus) -> Vec<&BookRecord> {
        self.iter().filter(|rec| rec.status == status).collect()
    }

    pub fn count_by_status(&self, status: BookStatus) -> usize {
        self.records.values().filter(|rec| rec.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_id(&self) -> BookId {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    fn draft(title: &str) -> BookDraft {
        BookDraft {
            title: title.to_string(),
            author: "A".to_string(),
            isbn: "978-3-16-148410-0".to_string(),
            description: "D".to_string(),
        }
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut table = BookTable::new();
        let a = table.create(draft("a"), time::now()).unwrap();
        let b = table.create(draft("b"), time::now()).unwrap();
        table.delete(b.id).unwrap();
        let c = table.create(draft("c"), time::now()).unwrap();

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        let titles: Vec<_> = table.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[test]
    fn update_of_missing_book_reports_not_found_before_validation() {
        let mut table = BookTable::new();
        let patch = BookPatch {
            isbn: Some("bogus".to_string()),
            ..BookPatch::default()
        };
        assert_eq!(
            table.update(9, &patch, time::now()),
            Err(StoreError::BookNotFound(9))
        );
    }

    #[test]
    fn rejected_create_consumes_no_id() {
        let mut table = BookTable::new();
        let mut bad = draft("x");
        bad.isbn = "123".to_string();
        assert!(matches!(
            table.create(bad, time::now()),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(table.create(draft("ok"), time::now()).unwrap().id, 1);
    }
}
