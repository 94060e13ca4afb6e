//! The vaccination store: profile, overlays and derived schedule views.
//!
//! [`VaccinationStore`] is the only component that mutates persisted state.
//! It owns the child profile, the completion and notes overlays and the set
//! of opted-in optional vaccinations, all keyed by catalog entry id so they
//! survive catalog reloads. Every mutation is written through the injected
//! [`KeyValueStore`] before it becomes visible, then announced to subscribers.

use crate::catalog::{CatalogProvider, CatalogResolution};
use crate::kv::{KeyValueStore, KvOp};
use crate::types::{
    ChildProfile, DueStatus, EntryKind, ScheduleItem, VaccineCatalog, VaccineScheduleEntry,
};
use crate::{Error, Result};
use chrono::{Months, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const PROFILE_KEY: &str = "profile";
pub const INCLUDED_OPTIONAL_KEY: &str = "includedOptionalIds";
pub const COMPLETION_KEY: &str = "completionStatus";
pub const NOTES_KEY: &str = "notes";

/// Lifecycle of the store, gated by presence of a profile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    Onboarding,
    Active,
}

/// How the catalog for the current profile was obtained
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogStatus {
    /// No profile, so no catalog was requested
    NotLoaded,
    Loaded {
        country: String,
    },
    /// The requested country failed and the fallback country is shown
    Fallback {
        requested: String,
        country: String,
        reason: String,
    },
    /// Nothing could be loaded; the schedule is empty
    Unavailable {
        requested: String,
        reason: String,
    },
}

impl CatalogStatus {
    /// True when the schedule shown is not the requested country's
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            CatalogStatus::Fallback { .. } | CatalogStatus::Unavailable { .. }
        )
    }
}

/// State-change notification delivered to subscribers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    ProfileChanged(ChildProfile),
    ProfileCleared,
    CompletionChanged { id: String, completed: bool },
    NoteChanged { id: String, note: Option<String> },
    OptionalChanged { id: String, included: bool },
}

/// Handle returned by [`VaccinationStore::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// Single owner of the profile and overlays
pub struct VaccinationStore<K: KeyValueStore> {
    kv: K,
    provider: CatalogProvider,
    profile: Option<ChildProfile>,
    catalog: Option<VaccineCatalog>,
    catalog_status: CatalogStatus,
    included_optional: BTreeSet<String>,
    completion: BTreeMap<String, bool>,
    notes: BTreeMap<String, String>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

/// Read one persisted record, treating anything unreadable as absent
fn load_record<T: DeserializeOwned>(kv: &impl KeyValueStore, key: &str) -> Option<T> {
    let bytes = match kv.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Unable to read stored '{}': {}. Using defaults.", key, e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = Error::PersistenceReadCorrupt {
                key: key.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!("{}. Using defaults.", err);
            None
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

impl<K: KeyValueStore> VaccinationStore<K> {
    /// Open a store over persisted state
    ///
    /// Corrupt or unreadable records are logged and treated as absent. When a
    /// profile is present its catalog is resolved immediately.
    pub fn open(kv: K, provider: CatalogProvider) -> Self {
        let profile: Option<ChildProfile> = load_record(&kv, PROFILE_KEY);

        let mut store = Self {
            kv,
            provider,
            profile: None,
            catalog: None,
            catalog_status: CatalogStatus::NotLoaded,
            included_optional: BTreeSet::new(),
            completion: BTreeMap::new(),
            notes: BTreeMap::new(),
            observers: Vec::new(),
            next_subscription: 0,
        };

        match profile {
            Some(profile) => {
                store.included_optional =
                    load_record::<Vec<String>>(&store.kv, INCLUDED_OPTIONAL_KEY)
                        .unwrap_or_default()
                        .into_iter()
                        .collect();
                store.completion =
                    load_record::<BTreeMap<String, bool>>(&store.kv, COMPLETION_KEY)
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|(_, done)| *done)
                        .collect();
                store.notes = load_record::<BTreeMap<String, String>>(&store.kv, NOTES_KEY)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(_, note)| !note.trim().is_empty())
                    .collect();
                let country = profile.country_code.clone();
                store.profile = Some(profile);
                store.reload_catalog_for(&country);
                tracing::debug!(
                    "Opened store for {} ({} completed, {} notes, {} optional)",
                    country,
                    store.completion.len(),
                    store.notes.len(),
                    store.included_optional.len()
                );
            }
            None => tracing::debug!("Opened store without a profile"),
        }

        store
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> StoreState {
        if self.profile.is_some() {
            StoreState::Active
        } else {
            StoreState::Onboarding
        }
    }

    pub fn profile(&self) -> Option<&ChildProfile> {
        self.profile.as_ref()
    }

    pub fn catalog(&self) -> Option<&VaccineCatalog> {
        self.catalog.as_ref()
    }

    pub fn catalog_status(&self) -> &CatalogStatus {
        &self.catalog_status
    }

    pub fn provider(&self) -> &CatalogProvider {
        &self.provider
    }

    pub fn completion(&self) -> &BTreeMap<String, bool> {
        &self.completion
    }

    pub fn notes(&self) -> &BTreeMap<String, String> {
        &self.notes
    }

    pub fn included_optional_ids(&self) -> &BTreeSet<String> {
        &self.included_optional
    }

    /// Give back the underlying key-value store
    pub fn into_inner(self) -> K {
        self.kv
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completion.get(id).copied().unwrap_or(false)
    }

    /// The note for `id`, empty if there is none
    pub fn note(&self, id: &str) -> &str {
        self.notes.get(id).map(String::as_str).unwrap_or("")
    }

    pub fn is_optional_included(&self, id: &str) -> bool {
        self.included_optional.contains(id)
    }

    /// Due date of an entry for the current child, `None` without a profile
    pub fn due_date(&self, entry: &VaccineScheduleEntry) -> Option<NaiveDate> {
        let profile = self.profile.as_ref()?;
        entry.age_offset.apply(profile.date_of_birth)
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register a callback invoked after every state change
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    fn emit(&mut self, event: StoreEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    // ========================================================================
    // Profile Lifecycle
    // ========================================================================

    /// Replace the profile and start over
    ///
    /// All three overlays are cleared in the same write as the new profile,
    /// then the catalog for the new country is loaded. A catalog failure does
    /// not undo the profile; the returned status flags it instead.
    pub fn set_profile(
        &mut self,
        date_of_birth: NaiveDate,
        country_code: &str,
    ) -> Result<CatalogStatus> {
        let country_code = crate::catalog::normalize_country_code(country_code)
            .unwrap_or_else(|| country_code.trim().to_string());
        let profile = ChildProfile {
            date_of_birth,
            country_code,
        };

        self.kv.apply(vec![
            KvOp::Set(PROFILE_KEY.into(), encode(&profile)?),
            KvOp::Remove(INCLUDED_OPTIONAL_KEY.into()),
            KvOp::Remove(COMPLETION_KEY.into()),
            KvOp::Remove(NOTES_KEY.into()),
        ])?;

        self.included_optional.clear();
        self.completion.clear();
        self.notes.clear();
        self.profile = Some(profile.clone());
        tracing::info!(
            "Profile set: born {}, country {}",
            profile.date_of_birth,
            profile.country_code
        );

        let status = self.reload_catalog_for(&profile.country_code);
        self.emit(StoreEvent::ProfileChanged(profile));
        Ok(status)
    }

    /// Forget the profile and every overlay, returning to onboarding
    pub fn clear_profile(&mut self) -> Result<()> {
        self.kv.apply(vec![
            KvOp::Remove(PROFILE_KEY.into()),
            KvOp::Remove(INCLUDED_OPTIONAL_KEY.into()),
            KvOp::Remove(COMPLETION_KEY.into()),
            KvOp::Remove(NOTES_KEY.into()),
        ])?;

        self.profile = None;
        self.catalog = None;
        self.catalog_status = CatalogStatus::NotLoaded;
        self.included_optional.clear();
        self.completion.clear();
        self.notes.clear();
        tracing::info!("Profile cleared");

        self.emit(StoreEvent::ProfileCleared);
        Ok(())
    }

    /// Resolve the catalog again for the current profile
    pub fn reload_catalog(&mut self) -> CatalogStatus {
        match self.profile.as_ref().map(|p| p.country_code.clone()) {
            Some(country) => self.reload_catalog_for(&country),
            None => CatalogStatus::NotLoaded,
        }
    }

    fn reload_catalog_for(&mut self, country_code: &str) -> CatalogStatus {
        let (catalog, status) = match self.provider.resolve(country_code) {
            CatalogResolution::Loaded(catalog) => {
                let status = CatalogStatus::Loaded {
                    country: catalog.country.clone(),
                };
                (Some(catalog), status)
            }
            CatalogResolution::Fallback {
                requested,
                catalog,
                cause,
            } => {
                let status = CatalogStatus::Fallback {
                    requested,
                    country: catalog.country.clone(),
                    reason: cause.to_string(),
                };
                (Some(catalog), status)
            }
            CatalogResolution::Unavailable { requested, cause } => {
                let status = CatalogStatus::Unavailable {
                    requested,
                    reason: cause.to_string(),
                };
                (None, status)
            }
        };
        self.catalog = catalog;
        self.catalog_status = status.clone();
        status
    }

    fn require_active(&self, operation: &str) -> bool {
        if self.profile.is_none() {
            tracing::debug!("Ignoring {} while onboarding", operation);
            return false;
        }
        true
    }

    // ========================================================================
    // Overlay Mutations
    // ========================================================================

    /// Flip the completion flag for `id` and return the new value
    ///
    /// Only completed ids are stored. While onboarding nothing changes and
    /// `false` is returned.
    pub fn toggle_completed(&mut self, id: &str) -> Result<bool> {
        if !self.require_active("toggle_completed") {
            return Ok(false);
        }

        let completed = !self.is_completed(id);
        let mut next = self.completion.clone();
        if completed {
            next.insert(id.to_string(), true);
        } else {
            next.remove(id);
        }
        self.kv.set(COMPLETION_KEY, &encode(&next)?)?;
        self.completion = next;

        tracing::debug!("Marked {} as {}", id, if completed { "done" } else { "not done" });
        self.emit(StoreEvent::CompletionChanged {
            id: id.to_string(),
            completed,
        });
        Ok(completed)
    }

    /// Set or clear the note for `id`
    ///
    /// Notes are trimmed; an empty or whitespace-only note removes the key.
    pub fn set_note(&mut self, text: &str, id: &str) -> Result<()> {
        if !self.require_active("set_note") {
            return Ok(());
        }

        let trimmed = text.trim();
        let note = (!trimmed.is_empty()).then(|| trimmed.to_string());
        if self.notes.get(id) == note.as_ref() {
            return Ok(());
        }

        let mut next = self.notes.clone();
        match &note {
            Some(note) => next.insert(id.to_string(), note.clone()),
            None => next.remove(id),
        };
        self.kv.set(NOTES_KEY, &encode(&next)?)?;
        self.notes = next;

        self.emit(StoreEvent::NoteChanged {
            id: id.to_string(),
            note,
        });
        Ok(())
    }

    /// Opt into a recommended vaccination
    ///
    /// Ids missing from the current catalog's recommended list are ignored.
    /// Returns whether the set changed.
    pub fn add_optional(&mut self, id: &str) -> Result<bool> {
        if !self.require_active("add_optional") {
            return Ok(false);
        }

        let known = self.catalog.as_ref().is_some_and(|c| c.is_recommended(id));
        if !known {
            tracing::debug!("Ignoring unknown optional vaccination '{}'", id);
            return Ok(false);
        }
        if self.included_optional.contains(id) {
            return Ok(false);
        }

        let mut next = self.included_optional.clone();
        next.insert(id.to_string());
        self.write_included(next)?;

        self.emit(StoreEvent::OptionalChanged {
            id: id.to_string(),
            included: true,
        });
        Ok(true)
    }

    /// Opt out of a recommended vaccination; returns whether the set changed
    pub fn remove_optional(&mut self, id: &str) -> Result<bool> {
        if !self.require_active("remove_optional") {
            return Ok(false);
        }
        if !self.included_optional.contains(id) {
            return Ok(false);
        }

        let mut next = self.included_optional.clone();
        next.remove(id);
        self.write_included(next)?;

        self.emit(StoreEvent::OptionalChanged {
            id: id.to_string(),
            included: false,
        });
        Ok(true)
    }

    fn write_included(&mut self, next: BTreeSet<String>) -> Result<()> {
        // BTreeSet serializes as a sorted sequence
        self.kv.set(INCLUDED_OPTIONAL_KEY, &encode(&next)?)?;
        self.included_optional = next;
        Ok(())
    }

    // ========================================================================
    // Derived Views
    // ========================================================================

    /// Sort by due date, unresolvable dates last, catalog order among ties
    fn sorted_by_due<'a>(
        &self,
        entries: impl Iterator<Item = &'a VaccineScheduleEntry>,
    ) -> Vec<&'a VaccineScheduleEntry> {
        let mut keyed: Vec<(Option<NaiveDate>, &VaccineScheduleEntry)> =
            entries.map(|entry| (self.due_date(entry), entry)).collect();
        keyed.sort_by_key(|(due, _)| (due.is_none(), *due));
        keyed.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Mandatory entries in due-date order
    pub fn mandatory_entries(&self) -> Vec<&VaccineScheduleEntry> {
        match &self.catalog {
            Some(catalog) => self.sorted_by_due(catalog.mandatory.iter()),
            None => Vec::new(),
        }
    }

    /// Recommended entries the user opted into, in due-date order
    pub fn included_optional_entries(&self) -> Vec<&VaccineScheduleEntry> {
        match &self.catalog {
            Some(catalog) => self.sorted_by_due(
                catalog
                    .recommended
                    .iter()
                    .filter(|e| self.included_optional.contains(&e.id)),
            ),
            None => Vec::new(),
        }
    }

    /// `(completed, total)` over the active schedule
    ///
    /// Completion marks for ids outside the current schedule don't count.
    pub fn progress(&self) -> (usize, usize) {
        let active: Vec<&VaccineScheduleEntry> = self
            .mandatory_entries()
            .into_iter()
            .chain(self.included_optional_entries())
            .collect();
        let completed = active.iter().filter(|e| self.is_completed(&e.id)).count();
        (completed, active.len())
    }

    /// Recommended entries not yet opted into, by case-insensitive name
    pub fn available_optional_entries(&self) -> Vec<&VaccineScheduleEntry> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        let mut entries: Vec<&VaccineScheduleEntry> = catalog
            .recommended
            .iter()
            .filter(|e| !self.included_optional.contains(&e.id))
            .collect();
        entries.sort_by_key(|e| e.name.to_lowercase());
        entries
    }

    /// The active schedule (mandatory plus opted-in optional) as of `today`
    pub fn schedule(&self, today: NaiveDate) -> Vec<ScheduleItem> {
        let mandatory = self
            .mandatory_entries()
            .into_iter()
            .map(|e| (e, EntryKind::Mandatory));
        let optional = self
            .included_optional_entries()
            .into_iter()
            .map(|e| (e, EntryKind::Optional));

        let mut items: Vec<ScheduleItem> = mandatory
            .chain(optional)
            .map(|(entry, kind)| self.schedule_item(entry, kind, today))
            .collect();
        items.sort_by_key(|item| (item.due_date.is_none(), item.due_date));
        items
    }

    fn schedule_item(
        &self,
        entry: &VaccineScheduleEntry,
        kind: EntryKind,
        today: NaiveDate,
    ) -> ScheduleItem {
        let due_date = self.due_date(entry);
        let completed = self.is_completed(&entry.id);
        let status = match (completed, due_date) {
            (true, _) => DueStatus::Done,
            (false, None) => DueStatus::Unknown,
            (false, Some(due)) if due < today => DueStatus::Overdue,
            (false, Some(_)) => DueStatus::Upcoming,
        };
        ScheduleItem {
            entry: entry.clone(),
            kind,
            due_date,
            completed,
            note: self.notes.get(&entry.id).cloned(),
            status,
        }
    }

    /// Scheduled, not completed, and due before `today`
    pub fn overdue(&self, today: NaiveDate) -> Vec<ScheduleItem> {
        self.schedule(today)
            .into_iter()
            .filter(|item| item.status == DueStatus::Overdue)
            .collect()
    }

    /// Scheduled, not completed, and due within `months_ahead` of `today`
    pub fn upcoming(&self, today: NaiveDate, months_ahead: u32) -> Vec<ScheduleItem> {
        let horizon = today.checked_add_months(Months::new(months_ahead));
        self.schedule(today)
            .into_iter()
            .filter(|item| item.status == DueStatus::Upcoming)
            .filter(|item| match (item.due_date, horizon) {
                (Some(due), Some(horizon)) => due <= horizon,
                _ => true,
            })
            .collect()
    }
}
