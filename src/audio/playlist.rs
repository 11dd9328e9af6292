// Playlist - ordered records, the cursor that walks them, and the JSON file between runs
// Entry ids are unique within a collection; the cursor follows an id, not an index

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::track::{MediaRecord, SharedRecord, NO_PLAYLIST_INDEX};
use crate::error::{Error, Result};
use crate::notify::{Notifier, Observable, SubscriptionId};

/// One notification per structural change, or per bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChanged {
    Added { start: usize, count: usize },
    Removed { index: usize },
    Reset,
}

impl CollectionChanged {
    // Contiguous appends stay an append, anything else collapses to a reset
    fn merge(self, next: CollectionChanged) -> CollectionChanged {
        match (self, next) {
            (
                CollectionChanged::Added { start, count },
                CollectionChanged::Added {
                    start: next_start,
                    count: next_count,
                },
            ) if next_start == start + count => CollectionChanged::Added {
                start,
                count: count + next_count,
            },
            _ => CollectionChanged::Reset,
        }
    }
}

/// Ordered records with `playlist_index == position + 1` for every entry,
/// restored before any observer hears about a change.
#[derive(Debug, Default)]
pub struct PlayListCollection {
    items: Vec<SharedRecord>,
    entries: HashSet<Uuid>,
    events: Notifier<CollectionChanged>,
    suspended: u32,
    pending: Option<CollectionChanged>,
}

impl PlayListCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SharedRecord> {
        self.items.get(index)
    }

    pub fn records(&self) -> &[SharedRecord] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedRecord> {
        self.items.iter()
    }

    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        if !self.entries.contains(&id) {
            return None;
        }
        self.items.iter().position(|r| r.borrow().id == id)
    }

    pub fn add(&mut self, record: SharedRecord) {
        let index = self.items.len();
        self.insert(index, record);
    }

    /// Append many records with a single notification.
    pub fn add_items<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = SharedRecord>,
    {
        let start = self.items.len();
        for record in records {
            let record = self.admit(record);
            self.items.push(record);
        }
        let count = self.items.len() - start;
        if count == 0 {
            return;
        }
        self.renumber(start);
        debug!("Added {} records to playlist", count);
        self.publish(CollectionChanged::Added { start, count });
    }

    /// Insert at `index`, clamped to the end.
    pub fn insert(&mut self, index: usize, record: SharedRecord) {
        let index = index.min(self.items.len());
        let record = self.admit(record);
        self.items.insert(index, record);
        self.renumber(index);
        self.publish(CollectionChanged::Added { start: index, count: 1 });
    }

    pub fn remove_at(&mut self, index: usize) -> Option<SharedRecord> {
        if index >= self.items.len() {
            return None;
        }
        let record = self.items.remove(index);
        {
            let mut r = record.borrow_mut();
            self.entries.remove(&r.id);
            r.playlist_index = NO_PLAYLIST_INDEX;
        }
        self.renumber(index);
        self.publish(CollectionChanged::Removed { index });
        Some(record)
    }

    pub fn remove(&mut self, record: &SharedRecord) -> bool {
        match self.items.iter().position(|r| Rc::ptr_eq(r, record)) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    /// Replace the whole content.
    pub fn reset(&mut self, records: Vec<SharedRecord>) {
        self.detach_all();
        for record in records {
            let record = self.admit(record);
            self.items.push(record);
        }
        self.renumber(0);
        self.publish(CollectionChanged::Reset);
    }

    pub fn clear(&mut self) {
        self.reset(Vec::new());
    }

    /// Reorder by performer, album, disc, track.
    pub fn sort_by_album_order(&mut self) {
        self.items
            .sort_by(|a, b| a.borrow().album_order(&b.borrow()));
        self.renumber(0);
        self.publish(CollectionChanged::Reset);
    }

    /// Hold notifications until the matching [`resume`](Self::resume). Nested
    /// calls are counted.
    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub fn resume(&mut self) {
        if self.suspended == 0 {
            return;
        }
        self.suspended -= 1;
        if self.suspended == 0 {
            if let Some(event) = self.pending.take() {
                self.events.notify(&event);
            }
        }
    }

    // A record object can only sit in one slot; a second add of the same
    // object becomes a distinct entry for the same file
    fn admit(&mut self, record: SharedRecord) -> SharedRecord {
        let id = record.borrow().id;
        if self.entries.insert(id) {
            return record;
        }
        let copy = record.borrow().duplicate();
        self.entries.insert(copy.id);
        copy.into_shared()
    }

    fn detach_all(&mut self) {
        for record in self.items.drain(..) {
            record.borrow_mut().playlist_index = NO_PLAYLIST_INDEX;
        }
        self.entries.clear();
    }

    fn renumber(&mut self, from: usize) {
        for (i, record) in self.items.iter().enumerate().skip(from) {
            record.borrow_mut().playlist_index = i as i32 + 1;
        }
    }

    fn publish(&mut self, event: CollectionChanged) {
        if self.suspended > 0 {
            self.pending = Some(match self.pending.take() {
                Some(pending) => pending.merge(event),
                None => event,
            });
            return;
        }
        self.events.notify(&event);
    }
}

impl Observable<CollectionChanged> for PlayListCollection {
    fn subscribe(&mut self, observer: Box<dyn FnMut(&CollectionChanged)>) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

/// Cursor over a [`PlayListCollection`]. The cursor follows an entry, not a
/// position, so edits elsewhere in the list don't move it.
#[derive(Debug)]
pub struct PlaylistNavigator {
    current: Option<Uuid>,
    rng: StdRng,
}

impl Default for PlaylistNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistNavigator {
    pub fn new() -> Self {
        Self {
            current: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            current: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn current_index(&self, collection: &PlayListCollection) -> Option<usize> {
        self.current.and_then(|id| collection.position_of(id))
    }

    pub fn select(&mut self, record: &SharedRecord) {
        self.current = Some(record.borrow().id);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    fn select_at(&mut self, collection: &PlayListCollection, index: usize) -> Option<SharedRecord> {
        let record = collection.get(index)?;
        self.select(record);
        Some(Rc::clone(record))
    }

    /// The tracked record, or a starting point when nothing is tracked.
    pub fn get_current(
        &mut self,
        collection: &PlayListCollection,
        shuffle: bool,
    ) -> Option<SharedRecord> {
        if let Some(index) = self.current_index(collection) {
            return collection.get(index).map(Rc::clone);
        }
        if collection.is_empty() {
            return None;
        }
        let index = if shuffle {
            self.rng.gen_range(0..collection.len())
        } else {
            0
        };
        self.select_at(collection, index)
    }

    pub fn get_next(
        &mut self,
        collection: &PlayListCollection,
        shuffle: bool,
    ) -> Option<SharedRecord> {
        if shuffle {
            return self.get_random_playlist_file(collection);
        }
        let len = collection.len();
        if len == 0 {
            return None;
        }
        let index = match self.current_index(collection) {
            Some(index) => (index + 1) % len,
            None => 0,
        };
        self.select_at(collection, index)
    }

    pub fn get_prev(
        &mut self,
        collection: &PlayListCollection,
        shuffle: bool,
    ) -> Option<SharedRecord> {
        if shuffle {
            return self.get_random_playlist_file(collection);
        }
        let len = collection.len();
        if len == 0 {
            return None;
        }
        let index = match self.current_index(collection) {
            Some(0) | None => len - 1,
            Some(index) => index - 1,
        };
        self.select_at(collection, index)
    }

    /// Random entry, never the current one while there is a choice.
    pub fn get_random_playlist_file(
        &mut self,
        collection: &PlayListCollection,
    ) -> Option<SharedRecord> {
        let len = collection.len();
        if len == 0 {
            return None;
        }
        let current = self.current_index(collection);
        let mut index = self.rng.gen_range(0..len);
        while len > 1 && Some(index) == current {
            index = self.rng.gen_range(0..len);
        }
        self.select_at(collection, index)
    }

    pub fn is_last_playlist_file(&self, collection: &PlayListCollection) -> bool {
        match self.current_index(collection) {
            Some(index) => index + 1 == collection.len(),
            None => false,
        }
    }
}

/// What gets written to disk between runs: tag snapshots in playback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistFile {
    pub saved_at: DateTime<Utc>,
    pub records: Vec<MediaRecord>,
}

impl PlaylistFile {
    pub fn from_collection(collection: &PlayListCollection) -> Self {
        Self {
            saved_at: Utc::now(),
            records: collection.iter().map(|r| r.borrow().clone()).collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved {} playlist entries to {}", self.records.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: PlaylistFile = serde_json::from_str(&content)?;
        Ok(file)
    }

    /// Like [`load`](Self::load), but a missing or broken file is just an
    /// empty playlist.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(file) => {
                info!("Loaded {} playlist entries from {}", file.records.len(), path.display());
                file
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("No playlist at {}", path.display());
                Self::empty()
            }
            Err(e) => {
                warn!("Ignoring unreadable playlist {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            saved_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn into_shared(self) -> Vec<SharedRecord> {
        self.records
            .into_iter()
            .map(MediaRecord::into_shared)
            .collect()
    }
}
