//! Shared hostname → address registry.
//!
//! The synchronizer is the only writer; every DNS request reads. Each call
//! takes the lock once, so a reader sees either all of an upsert or none of
//! it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::types::AddressSet;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Arc<RwLock<HashMap<String, AddressSet>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets every hostname to `addresses`, replacing previous values.
    pub async fn upsert(&self, hostnames: &[String], addresses: &AddressSet) {
        let mut map = self.records.write().await;
        for hostname in hostnames {
            map.insert(key(hostname), addresses.clone());
        }
        debug!("Upserted {:?} -> {:?}", hostnames, addresses);
    }

    /// Removes every hostname that is present. Absent names are ignored.
    pub async fn delete(&self, hostnames: &[String]) {
        let mut map = self.records.write().await;
        for hostname in hostnames {
            map.remove(&key(hostname));
        }
        debug!("Deleted {:?}", hostnames);
    }

    pub async fn lookup(&self, hostname: &str) -> Option<AddressSet> {
        let map = self.records.read().await;
        map.get(&key(hostname)).cloned()
    }

    /// Swaps in a completely new set of records.
    pub async fn replace_all(&self, records: HashMap<String, AddressSet>) {
        let records = records
            .into_iter()
            .map(|(hostname, addresses)| (key(&hostname), addresses))
            .collect();
        *self.records.write().await = records;
    }

    /// Consistent copy of all records, ordered by hostname.
    pub async fn snapshot(&self) -> BTreeMap<String, AddressSet> {
        let map = self.records.read().await;
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn key(hostname: &str) -> String {
    hostname.to_ascii_lowercase()
}
