//! In-memory projection of the live appointments.

use std::collections::{BTreeSet, HashMap};

use watchtower_primitives::{
    appointment::AppointmentId, locator::Locator, types::BitcoinBlockHeight,
};

/// What the watcher keeps in memory for each appointment. The blob stays in persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub locator: Locator,
    pub end_time: BitcoinBlockHeight,
}

/// Live appointments keyed by id, plus the locator index pointing into them.
///
/// Every mutation keeps both maps consistent: a locator is indexed if and only if at least one
/// entry carries it, and every indexed id is an entry.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<AppointmentId, RegistryEntry>,
    locator_index: HashMap<Locator, BTreeSet<AppointmentId>>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &AppointmentId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Inserts (or replaces) the entry for `id`.
    pub fn insert(&mut self, id: AppointmentId, entry: RegistryEntry) {
        if let Some(previous) = self.entries.insert(id, entry) {
            self.unindex(&previous.locator, &id);
        }

        self.locator_index
            .entry(entry.locator)
            .or_default()
            .insert(id);
    }

    /// Removes the entry for `id` along with its index entry.
    pub fn remove(&mut self, id: &AppointmentId) -> Option<RegistryEntry> {
        let entry = self.entries.remove(id)?;
        self.unindex(&entry.locator, id);

        Some(entry)
    }

    pub fn contains_locator(&self, locator: &Locator) -> bool {
        self.locator_index.contains_key(locator)
    }

    /// Ids of the appointments registered under `locator`, in ascending order.
    pub fn ids_for(&self, locator: &Locator) -> Vec<AppointmentId> {
        self.locator_index
            .get(locator)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Entries for which `is_expired(end_time)` holds.
    pub fn expired(
        &self,
        is_expired: impl Fn(BitcoinBlockHeight) -> bool,
    ) -> Vec<(AppointmentId, RegistryEntry)> {
        self.entries
            .iter()
            .filter(|(_, entry)| is_expired(entry.end_time))
            .map(|(id, entry)| (*id, *entry))
            .collect()
    }

    fn unindex(&mut self, locator: &Locator, id: &AppointmentId) {
        if let Some(ids) = self.locator_index.get_mut(locator) {
            ids.remove(id);

            if ids.is_empty() {
                self.locator_index.remove(locator);
            }
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let indexed = self
            .locator_index
            .iter()
            .all(|(locator, ids)| {
                !ids.is_empty()
                    && ids
                        .iter()
                        .all(|id| self.entries.get(id).is_some_and(|e| e.locator == *locator))
            });

        let covered = self.entries.iter().all(|(id, entry)| {
            self.locator_index
                .get(&entry.locator)
                .is_some_and(|ids| ids.contains(id))
        });

        indexed && covered
    }
}
