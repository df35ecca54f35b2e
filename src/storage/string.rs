//! String values.

use crate::storage::engine::{Entry, Tx, Value};
use crate::storage::error::{Error, Result};
use bytes::Bytes;

/// Conditions and expiry for [`Strings::set_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Absolute expiry in unix milliseconds
    pub expires_at: Option<i64>,
    /// Keep the expiry the key already has
    pub keep_ttl: bool,
    /// Only set if the key does not exist
    pub if_not_exists: bool,
    /// Only set if the key exists
    pub if_exists: bool,
}

/// Outcome of [`Strings::set_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOut {
    /// Value before the call
    pub prev: Option<Bytes>,
    /// Whether the value was written
    pub updated: bool,
}

/// String operations inside a transaction.
pub struct Strings<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl Strings<'_, '_> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.tx.get::<Bytes>(key)?.cloned())
    }

    /// Fetches several keys. Missing keys and non-strings come back as `None`.
    pub fn get_many(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        keys.iter()
            .map(|key| self.tx.get::<Bytes>(key).ok().flatten().cloned())
            .collect()
    }

    pub fn set(&mut self, key: &Bytes, value: Bytes) -> Result<()> {
        self.set_with(key, value, SetOptions::default()).map(|_| ())
    }

    /// Sets a value subject to `opts`.
    pub fn set_with(&mut self, key: &Bytes, value: Bytes, opts: SetOptions) -> Result<SetOut> {
        let (prev, expires_at) = match self.tx.live(key) {
            None => (None, None),
            Some(Entry {
                value: Value::Str(prev),
                expires_at,
            }) => (Some(prev.clone()), *expires_at),
            Some(_) => return Err(Error::KeyType),
        };

        let exists = self.tx.live(key).is_some();
        if (opts.if_not_exists && exists) || (opts.if_exists && !exists) {
            return Ok(SetOut {
                prev,
                updated: false,
            });
        }

        let expires_at = if opts.keep_ttl { expires_at } else { opts.expires_at };
        self.tx
            .put(key.clone(), Entry::with_expiry(Value::Str(value), expires_at));
        Ok(SetOut {
            prev,
            updated: true,
        })
    }

    /// Sets several keys at once. Fails without writing anything if one of
    /// them holds another type.
    pub fn set_many(&mut self, items: &[(Bytes, Bytes)]) -> Result<()> {
        for (key, value) in items {
            self.set(key, value.clone())?;
        }
        Ok(())
    }

    /// Sets `key` and returns the previous value.
    pub fn get_set(&mut self, key: &Bytes, value: Bytes) -> Result<Option<Bytes>> {
        Ok(self.set_with(key, value, SetOptions::default())?.prev)
    }

    /// Deletes `key` and returns its value.
    pub fn get_del(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.tx.remove(key);
        }
        Ok(value)
    }

    /// Appends to the value at `key`, creating it if missing. Returns the
    /// new length.
    pub fn append(&mut self, key: &Bytes, suffix: &[u8]) -> Result<usize> {
        let value = self.tx.get_or_create::<Bytes>(key)?;
        let mut joined = Vec::with_capacity(value.len() + suffix.len());
        joined.extend_from_slice(value);
        joined.extend_from_slice(suffix);
        *value = Bytes::from(joined);
        Ok(value.len())
    }

    pub fn len(&self, key: &[u8]) -> Result<usize> {
        Ok(self.tx.get::<Bytes>(key)?.map_or(0, |value| value.len()))
    }

    /// Adds `delta` to the integer stored at `key`. A missing key counts
    /// as 0. The key's expiry is kept.
    pub fn incr(&mut self, key: &Bytes, delta: i64) -> Result<i64> {
        match self.tx.get_mut::<Bytes>(key)? {
            Some(value) => {
                let n = parse_int(value)?
                    .checked_add(delta)
                    .ok_or(Error::ValueType)?;
                *value = Bytes::from(n.to_string());
                Ok(n)
            }
            None => {
                self.tx
                    .put(key.clone(), Entry::new(Value::Str(Bytes::from(delta.to_string()))));
                Ok(delta)
            }
        }
    }

    /// Adds `delta` to the float stored at `key`.
    pub fn incr_float(&mut self, key: &Bytes, delta: f64) -> Result<f64> {
        match self.tx.get_mut::<Bytes>(key)? {
            Some(value) => {
                let n = parse_float(value)? + delta;
                if !n.is_finite() {
                    return Err(Error::ValueType);
                }
                *value = Bytes::from(n.to_string());
                Ok(n)
            }
            None => {
                if !delta.is_finite() {
                    return Err(Error::ValueType);
                }
                self.tx
                    .put(key.clone(), Entry::new(Value::Str(Bytes::from(delta.to_string()))));
                Ok(delta)
            }
        }
    }
}

pub(crate) fn parse_int(value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::ValueType)
}

pub(crate) fn parse_float(value: &[u8]) -> Result<f64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|n| !n.is_nan())
        .ok_or(Error::ValueType)
}
