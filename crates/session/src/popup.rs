//! Popup content lifecycle.
//!
//! At most one content instance is live per session. Replacing or closing a
//! popup detaches the old instance at once and defers its unmount to the
//! next microtask flush, so teardown never runs inside the dispatch that
//! triggered it.

use catalog::LocatedEntity;
use foundation::bounds::LngLat;
use foundation::ids::EntityId;
use render::{ContentId, PopupContent, RenderBackend, RenderError};
use runtime::MicrotaskQueue;
use tracing::debug;

const DESCRIPTION_LIMIT: usize = 200;

/// Summary card shown in an entity popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupCard {
    pub entity_id: EntityId,
    pub title: String,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub details_href: String,
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl PopupCard {
    pub fn for_entity(entity: &LocatedEntity) -> Self {
        Self {
            entity_id: entity.id,
            title: entity.display_name().to_string(),
            location: non_blank(entity.location.as_deref()),
            phone: non_blank(entity.phone_number.as_deref()),
            description: non_blank(entity.description.as_deref())
                .map(|d| truncate(&d, DESCRIPTION_LIMIT)),
            details_href: format!("/business/{}", entity.id),
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"map-popup\">");
        html.push_str(&format!(
            "<div class=\"map-popup__title\">{}</div>",
            escape_html(&self.title)
        ));
        if let Some(location) = &self.location {
            html.push_str(&format!(
                "<div class=\"map-popup__row\">{}</div>",
                escape_html(location)
            ));
        }
        if let Some(phone) = &self.phone {
            html.push_str(&format!(
                "<div class=\"map-popup__row\">Phone: {}</div>",
                escape_html(phone)
            ));
        }
        if let Some(description) = &self.description {
            html.push_str(&format!(
                "<p class=\"map-popup__description\">{}</p>",
                escape_html(description)
            ));
        }
        html.push_str(&format!(
            "<a class=\"map-popup__action\" href=\"{}\">View details</a></div>",
            escape_html(&self.details_href)
        ));
        html
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActivePopup {
    pub entity_id: EntityId,
    pub instance: ContentId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PopupPhase {
    Mounted,
    Unmounted,
}

/// Most recent lifecycle entries kept by [`PopupContentManager`].
pub const POPUP_LOG_LIMIT: usize = 64;

/// One entry of the mount/unmount log.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PopupLifecycle {
    pub instance: ContentId,
    pub entity_id: EntityId,
    pub phase: PopupPhase,
}

#[derive(Debug, Default)]
pub struct PopupContentManager {
    next_instance: u64,
    active: Option<ActivePopup>,
    detached: MicrotaskQueue<ActivePopup>,
    log: Vec<PopupLifecycle>,
    mounted_total: u64,
    unmounted_total: u64,
}

impl PopupContentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current popup with a card for `entity` at `anchor`.
    pub fn open(
        &mut self,
        entity: &LocatedEntity,
        anchor: LngLat,
        backend: &mut dyn RenderBackend,
    ) -> Result<ContentId, RenderError> {
        self.close(backend);

        let instance = ContentId(self.next_instance);
        self.next_instance += 1;
        let content = PopupContent {
            instance,
            html: PopupCard::for_entity(entity).to_html(),
        };
        backend.show_popup(entity.id, anchor, content)?;

        let popup = ActivePopup {
            entity_id: entity.id,
            instance,
        };
        self.active = Some(popup);
        self.record(popup, PopupPhase::Mounted);
        debug!(entity = %entity.id, instance = instance.0, "popup mounted");
        Ok(instance)
    }

    /// Hides the current popup; its content unmounts on the next flush.
    pub fn close(&mut self, backend: &mut dyn RenderBackend) {
        if self.active.is_some() {
            backend.hide_popup();
        }
        self.detach();
    }

    /// Detaches the current instance without touching a backend, for when
    /// the backend that showed it is already gone.
    pub fn detach(&mut self) {
        if let Some(popup) = self.active.take() {
            self.detached.defer(popup);
        }
    }

    /// Unmounts detached instances. Returns how many.
    pub fn flush(&mut self) -> usize {
        let done = self.detached.drain();
        for popup in &done {
            self.record(*popup, PopupPhase::Unmounted);
        }
        done.len()
    }

    /// Unmounts everything now, for view close.
    pub fn teardown(&mut self) {
        self.detach();
        self.flush();
    }

    pub fn active(&self) -> Option<ActivePopup> {
        self.active
    }

    /// Instances that are mounted and attached to a backend.
    pub fn live_count(&self) -> usize {
        usize::from(self.active.is_some())
    }

    /// Detached instances still awaiting unmount.
    pub fn pending_unmounts(&self) -> usize {
        self.detached.len()
    }

    /// The last [`POPUP_LOG_LIMIT`] mounts and unmounts, oldest first.
    pub fn mounted_log(&self) -> &[PopupLifecycle] {
        &self.log
    }

    /// Mounts and unmounts over the manager's lifetime.
    pub fn totals(&self) -> (u64, u64) {
        (self.mounted_total, self.unmounted_total)
    }

    fn record(&mut self, popup: ActivePopup, phase: PopupPhase) {
        match phase {
            PopupPhase::Mounted => self.mounted_total += 1,
            PopupPhase::Unmounted => self.unmounted_total += 1,
        }
        if self.log.len() >= POPUP_LOG_LIMIT {
            let excess = self.log.len() + 1 - POPUP_LOG_LIMIT;
            self.log.drain(..excess);
        }
        self.log.push(PopupLifecycle {
            instance: popup.instance,
            entity_id: popup.entity_id,
            phase,
        });
    }
}
