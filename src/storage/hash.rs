//! Hash values: maps of field -> value under a single key.

use crate::storage::engine::{Hash, Tx};
use crate::storage::error::{Error, Result};
use crate::storage::glob::Glob;
use crate::storage::rows::ScanResult;
use crate::storage::string::{parse_float, parse_int};
use bytes::Bytes;

/// Hash operations inside a transaction.
pub struct Hashes<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl Hashes<'_, '_> {
    pub fn get(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>> {
        Ok(self
            .tx
            .get::<Hash>(key)?
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    pub fn get_many(&self, key: &[u8], fields: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        let hash = self.tx.get::<Hash>(key)?;
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(field)).cloned())
            .collect())
    }

    pub fn exists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        Ok(self.tx.get::<Hash>(key)?.is_some_and(|hash| hash.contains(field)))
    }

    pub fn len(&self, key: &[u8]) -> Result<usize> {
        Ok(self.tx.get::<Hash>(key)?.map_or(0, |hash| hash.len()))
    }

    /// Sets a field. Returns true if the field was created.
    pub fn set(&mut self, key: &Bytes, field: Bytes, value: Bytes) -> Result<bool> {
        let hash = self.tx.get_or_create::<Hash>(key)?;
        Ok(hash.insert(field, value).is_none())
    }

    /// Sets several fields. Returns how many were created.
    pub fn set_many(&mut self, key: &Bytes, items: &[(Bytes, Bytes)]) -> Result<usize> {
        let hash = self.tx.get_or_create::<Hash>(key)?;
        Ok(items
            .iter()
            .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
            .count())
    }

    /// Sets a field only if it does not exist yet.
    pub fn set_not_exists(&mut self, key: &Bytes, field: Bytes, value: Bytes) -> Result<bool> {
        if self.exists(key, &field)? {
            return Ok(false);
        }
        self.set(key, field, value)
    }

    /// Deletes fields, returning how many existed.
    pub fn delete(&mut self, key: &[u8], fields: &[Bytes]) -> Result<usize> {
        let Some(hash) = self.tx.get_mut::<Hash>(key)? else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|field| hash.remove(field).is_some())
            .count();
        self.tx.remove_if_empty(key);
        Ok(removed)
    }

    pub fn fields(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.items(key)?.into_iter().map(|(field, _)| field).collect())
    }

    pub fn values(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.items(key)?.into_iter().map(|(_, value)| value).collect())
    }

    /// Returns all field-value pairs in insertion order.
    pub fn items(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        Ok(self.tx.get::<Hash>(key)?.map_or_else(Vec::new, |hash| {
            hash.iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        }))
    }

    /// Adds `delta` to an integer field. A missing field counts as 0.
    pub fn incr(&mut self, key: &Bytes, field: &Bytes, delta: i64) -> Result<i64> {
        let hash = self.tx.get_or_create::<Hash>(key)?;
        let current = match hash.get(field) {
            Some(value) => parse_int(value)?,
            None => 0,
        };
        let n = current.checked_add(delta).ok_or(Error::ValueType)?;
        hash.insert(field.clone(), Bytes::from(n.to_string()));
        Ok(n)
    }

    /// Adds `delta` to a float field. A missing field counts as 0.
    pub fn incr_float(&mut self, key: &Bytes, field: &Bytes, delta: f64) -> Result<f64> {
        let hash = self.tx.get_or_create::<Hash>(key)?;
        let current = match hash.get(field) {
            Some(value) => parse_float(value)?,
            None => 0.0,
        };
        let n = current + delta;
        if !n.is_finite() {
            return Err(Error::ValueType);
        }
        hash.insert(field.clone(), Bytes::from(n.to_string()));
        Ok(n)
    }

    /// Fetches one page of field-value pairs after `cursor`.
    pub fn scan(
        &self,
        key: &[u8],
        cursor: u64,
        pattern: &Glob,
        count: usize,
    ) -> Result<ScanResult<(Bytes, Bytes)>> {
        let Some(hash) = self.tx.get::<Hash>(key)? else {
            return Ok(ScanResult::empty());
        };
        let (page, cursor) = hash.page(cursor, count);
        let items = page
            .into_iter()
            .filter(|(field, _)| pattern.matches(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        Ok(ScanResult { cursor, items })
    }
}
