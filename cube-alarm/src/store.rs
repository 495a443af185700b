//! Alarm persistence.
//!
//! The store keeps every alarm in memory and mirrors the whole set to a JSON
//! file on each mutation. A mutation is staged on a copy of the map and only
//! swapped in once the file has been written, so a failed write leaves both
//! memory and disk at the previous state.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use crate::alarm::{Alarm, AlarmId, AlarmPatch, NewAlarm};
use crate::tracing::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("alarm {0} not found")]
    NotFound(AlarmId),

    #[error("alarm {0} already exists")]
    Duplicate(AlarmId),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: malformed alarm file: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

type Alarms = BTreeMap<AlarmId, Alarm>;

#[derive(Debug)]
pub struct AlarmStore {
    /// Backing file. `None` keeps alarms in memory only.
    path: Option<PathBuf>,
    alarms: RwLock<Alarms>,
}

impl AlarmStore {
    /// Load the store from `path`. A missing file is an empty store; the file
    /// is created on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let alarms = match std::fs::read(&path) {
            Ok(data) => {
                let list: Vec<Alarm> =
                    serde_json::from_slice(&data).map_err(|source| StoreError::Format {
                        path: path.clone(),
                        source,
                    })?;
                list.into_iter().map(|a| (a.id.clone(), a)).collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No alarm file yet, starting empty");
                Alarms::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        info!(path = %path.display(), count = alarms.len(), "Alarm store loaded");

        Ok(Self {
            path: Some(path),
            alarms: RwLock::new(alarms),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            alarms: RwLock::new(Alarms::new()),
        }
    }

    pub fn list(&self) -> Vec<Alarm> {
        self.alarms.read().values().cloned().collect()
    }

    pub fn get(&self, id: &AlarmId) -> Option<Alarm> {
        self.alarms.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.alarms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.read().is_empty()
    }

    pub fn create(&self, new: NewAlarm) -> Result<Alarm, StoreError> {
        let now = Utc::now();
        self.commit(|alarms| {
            let id = match new.id.clone() {
                Some(id) if alarms.contains_key(&id) => return Err(StoreError::Duplicate(id)),
                Some(id) => id,
                None => unique_id(alarms, now),
            };
            let alarm = new.into_alarm(id.clone(), now);
            alarms.insert(id, alarm.clone());
            Ok(alarm)
        })
    }

    pub fn update(&self, id: &AlarmId, patch: AlarmPatch) -> Result<Alarm, StoreError> {
        self.commit(|alarms| {
            let alarm = alarms
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            patch.apply(alarm);
            Ok(alarm.clone())
        })
    }

    pub fn delete(&self, id: &AlarmId) -> Result<Alarm, StoreError> {
        self.commit(|alarms| {
            alarms
                .remove(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))
        })
    }

    /// Flip `enabled` and return the updated alarm.
    pub fn toggle(&self, id: &AlarmId) -> Result<Alarm, StoreError> {
        self.commit(|alarms| {
            let alarm = alarms
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            alarm.enabled = !alarm.enabled;
            Ok(alarm.clone())
        })
    }

    /// Apply `change` to a copy of the alarm set, persist the copy, then
    /// publish it. Writers are serialized by the write lock.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut Alarms) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut alarms = self.alarms.write();
        let mut staged = alarms.clone();
        let result = change(&mut staged)?;

        if let Some(path) = &self.path {
            persist(path, &staged)?;
        }

        *alarms = staged;
        Ok(result)
    }
}

fn unique_id(alarms: &Alarms, now: chrono::DateTime<Utc>) -> AlarmId {
    let mut now = now;
    loop {
        let id = AlarmId::generate(now);
        if !alarms.contains_key(&id) {
            return id;
        }
        now += chrono::Duration::microseconds(1);
    }
}

/// Write the set to a sibling temp file and rename it over `path`.
fn persist(path: &Path, alarms: &Alarms) -> Result<(), StoreError> {
    let list: Vec<&Alarm> = alarms.values().collect();
    let data = serde_json::to_vec_pretty(&list).map_err(|source| StoreError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        io_err(source)
    })?;

    trace!(path = %path.display(), count = alarms.len(), "Alarm file written");
    Ok(())
}
