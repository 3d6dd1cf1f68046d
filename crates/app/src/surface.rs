use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_core::RegionSurface;

/// Headless region: the rendered markup and its named slots live in memory
/// for a frontend (or a test) to read back.
pub struct InMemoryRegion {
    label: &'static str,
    content: Mutex<RegionContent>,
    installs: AtomicUsize,
}

#[derive(Default)]
struct RegionContent {
    markup: String,
    slots: HashMap<String, String>,
}

impl InMemoryRegion {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            content: Mutex::new(RegionContent::default()),
            installs: AtomicUsize::new(0),
        }
    }

    pub fn markup(&self) -> String {
        self.lock().markup.clone()
    }

    /// Number of whole-region installs; fast-path patches do not count.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn slot(&self, name: &str) -> Option<String> {
        self.lock().slots.get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegionContent> {
        self.content
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegionSurface for InMemoryRegion {
    fn install(&self, markup: &str) {
        tracing::debug!(region = self.label, bytes = markup.len(), "region install");
        self.installs.fetch_add(1, Ordering::SeqCst);
        let mut content = self.lock();
        content.markup = markup.to_string();
        content.slots.clear();
    }

    fn patch(&self, slot: &str, markup: &str) {
        tracing::debug!(region = self.label, slot, bytes = markup.len(), "region patch");
        self.lock().slots.insert(slot.to_string(), markup.to_string());
    }

    fn show_error(&self, message: &str) {
        tracing::debug!(region = self.label, message, "region error state");
        let mut content = self.lock();
        content.markup = format!("<p class=\"load-error\">{message}</p>");
        content.slots.clear();
    }

    fn show_empty(&self, title: &str, hint: &str) {
        let mut content = self.lock();
        content.markup = format!(
            "<div class=\"empty-state\"><h3>{title}</h3><p>{hint}</p></div>"
        );
        content.slots.clear();
    }
}
