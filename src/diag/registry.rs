//! Open-device registry shared by the menus of one diagnostic session.

/// Ordered set of open device handles with one active entry.
#[derive(Debug, Clone)]
pub struct DeviceRegistry<H> {
    handles: Vec<H>,
    active: Option<usize>,
}

impl<H> Default for DeviceRegistry<H> {
    fn default() -> Self {
        Self {
            handles: Vec::new(),
            active: None,
        }
    }
}

impl<H: Copy + PartialEq> DeviceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<H> {
        self.active.map(|i| self.handles[i])
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Add `handle` and make it active. Re-adding an entry only activates it.
    pub fn open(&mut self, handle: H) {
        let index = match self.handles.iter().position(|h| *h == handle) {
            Some(index) => index,
            None => {
                self.handles.push(handle);
                self.handles.len() - 1
            }
        };
        self.active = Some(index);
    }

    /// Add `handle` if absent. It only becomes active when nothing is.
    pub fn insert(&mut self, handle: H) {
        if !self.handles.contains(&handle) {
            self.handles.push(handle);
        }
        if self.active.is_none() {
            self.active = Some(0);
        }
    }

    /// Make the entry at `index` active. Returns false if out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.handles.len() {
            self.active = Some(index);
            true
        } else {
            false
        }
    }

    /// Drop `handle`. When it was active, the first remaining entry takes over.
    pub fn remove(&mut self, handle: H) -> bool {
        let Some(index) = self.handles.iter().position(|h| *h == handle) else {
            return false;
        };
        self.handles.remove(index);
        self.active = match self.active {
            _ if self.handles.is_empty() => None,
            Some(active) if active == index => Some(0),
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        true
    }

    /// Keep only the entries `keep` accepts, preserving the active one if kept.
    pub fn retain(&mut self, mut keep: impl FnMut(&H) -> bool) {
        let active = self.active();
        self.handles.retain(|h| keep(h));
        self.active = match active.and_then(|a| self.handles.iter().position(|h| *h == a)) {
            Some(index) => Some(index),
            None if self.handles.is_empty() => None,
            None => Some(0),
        };
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = H> + '_ {
        self.handles.iter().copied()
    }

    /// Remove every entry, returning them in order.
    pub fn drain(&mut self) -> Vec<H> {
        self.active = None;
        std::mem::take(&mut self.handles)
    }
}
