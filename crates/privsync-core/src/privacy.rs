use std::rc::Rc;

use futures::Stream;
use tokio::sync::watch;

use crate::api::{PaidReactionTransport, SettingsTransport};
use crate::constants::SUGGESTION_AUTOARCHIVE_POPULAR;
use crate::models::{GlobalPrivacyFlags, PrivacySettings, UnarchiveOnNewMessage};
use crate::session::{EntitlementContext, FeatureFlag};
use crate::sync::{stream, Callback, SettingSynchronizer, SyncStatus, Variable};

/// Account-wide privacy settings of one session.
///
/// Every single-field update re-sends the full bundle, since the server only
/// accepts the settings as a whole.
pub struct GlobalPrivacy {
    sync: SettingSynchronizer<PrivacySettings>,
    entitlements: Rc<dyn EntitlementContext>,
    paid_transport: Rc<dyn PaidReactionTransport>,
    paid_reaction: Rc<PaidReactionPrivacy>,
}

/// Progress of the one-time paid reaction privacy fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotRequested,
    Pending,
    Loaded,
    Failed,
}

struct PaidReactionPrivacy {
    anonymous: Variable<bool>,
    load: watch::Sender<LoadState>,
}

impl GlobalPrivacy {
    pub fn new(
        transport: Rc<dyn SettingsTransport<GlobalPrivacyFlags>>,
        paid_transport: Rc<dyn PaidReactionTransport>,
        entitlements: Rc<dyn EntitlementContext>,
    ) -> Self {
        Self {
            sync: SettingSynchronizer::new("global-privacy", transport, entitlements.clone()),
            entitlements,
            paid_transport,
            paid_reaction: Rc::new(PaidReactionPrivacy {
                anonymous: Variable::new(false),
                load: watch::channel(LoadState::NotRequested).0,
            }),
        }
    }

    pub fn reload(&self, callback: Option<Callback>) {
        self.sync.reload(callback);
    }

    pub fn settings(&self) -> PrivacySettings {
        self.sync.current()
    }

    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub async fn settled(&self) {
        self.sync.settled().await;
    }

    pub fn update(&self, settings: PrivacySettings) {
        self.sync.update(settings);
    }

    // ===== Archive and mute =====

    pub fn archive_and_mute_current(&self) -> bool {
        self.sync.current().archive_and_mute
    }

    pub fn archive_and_mute(&self) -> impl Stream<Item = bool> {
        self.sync.field(|s| s.archive_and_mute)
    }

    pub fn update_archive_and_mute(&self, value: bool) {
        self.update(PrivacySettings {
            archive_and_mute: value,
            ..self.settings()
        });
    }

    /// Whether the archive-and-mute toggle should be offered at all: either it
    /// is already on, or the server made the setting available.
    pub fn show_archive_and_mute_current(&self) -> bool {
        self.archive_and_mute_current()
            || self
                .entitlements
                .is_feature_enabled(FeatureFlag::AutoarchiveSettingAvailable)
    }

    pub fn show_archive_and_mute(&self) -> impl Stream<Item = bool> {
        stream::combine(
            self.sync.subscribe(),
            self.entitlements
                .feature_flag(FeatureFlag::AutoarchiveSettingAvailable),
            |settings, available| settings.archive_and_mute || *available,
        )
    }

    /// Fires each time the server starts suggesting archive-and-mute.
    pub fn suggest_archive_and_mute(&self) -> impl Stream<Item = ()> {
        stream::rising_edges(self.entitlements.pending_suggestions(), |pending| {
            pending.contains(SUGGESTION_AUTOARCHIVE_POPULAR)
        })
    }

    pub fn dismiss_archive_and_mute_suggestion(&self) {
        self.entitlements
            .dismiss_suggestion(SUGGESTION_AUTOARCHIVE_POPULAR);
    }

    // ===== Unarchive on new message =====

    pub fn unarchive_on_new_message_current(&self) -> UnarchiveOnNewMessage {
        self.sync.current().unarchive_on_new_message
    }

    pub fn unarchive_on_new_message(&self) -> impl Stream<Item = UnarchiveOnNewMessage> {
        self.sync.field(|s| s.unarchive_on_new_message)
    }

    pub fn update_unarchive_on_new_message(&self, value: UnarchiveOnNewMessage) {
        self.update(PrivacySettings {
            unarchive_on_new_message: value,
            ..self.settings()
        });
    }

    // ===== Hide read time =====

    pub fn hide_read_time_current(&self) -> bool {
        self.sync.current().hide_read_time
    }

    pub fn hide_read_time(&self) -> impl Stream<Item = bool> {
        self.sync.field(|s| s.hide_read_time)
    }

    pub fn update_hide_read_time(&self, value: bool) {
        self.update(PrivacySettings {
            hide_read_time: value,
            ..self.settings()
        });
    }

    // ===== New contacts require premium =====

    pub fn new_require_premium_current(&self) -> bool {
        self.sync.current().new_require_premium
    }

    pub fn new_require_premium(&self) -> impl Stream<Item = bool> {
        self.sync.field(|s| s.new_require_premium)
    }

    pub fn update_new_require_premium(&self, value: bool) {
        self.update(PrivacySettings {
            new_require_premium: value,
            ..self.settings()
        });
    }

    // ===== Paid reaction anonymity =====

    /// Fetch the paid reaction privacy once per session. Later calls are
    /// no-ops even if the first fetch failed.
    pub fn load_paid_reaction_anonymous(&self) {
        let requested = self.paid_reaction.load.send_if_modified(|state| {
            if *state != LoadState::NotRequested {
                return false;
            }
            *state = LoadState::Pending;
            true
        });
        if !requested {
            return;
        }

        let request = self.paid_transport.get_paid_reaction_privacy();
        let target = Rc::downgrade(&self.paid_reaction);
        tokio::task::spawn_local(async move {
            let result = request.await;
            let Some(target) = target.upgrade() else {
                return;
            };
            match result {
                Ok(anonymous) => {
                    target.anonymous.set(anonymous);
                    target.load.send_replace(LoadState::Loaded);
                }
                Err(err) => {
                    tracing::warn!("paid reaction privacy request failed: {}", err);
                    target.load.send_replace(LoadState::Failed);
                }
            }
        });
    }

    pub fn paid_reaction_load_state(&self) -> LoadState {
        *self.paid_reaction.load.borrow()
    }

    /// Waits until the fetch started by
    /// [`load_paid_reaction_anonymous`](Self::load_paid_reaction_anonymous)
    /// is no longer pending.
    pub async fn paid_reaction_loaded(&self) -> LoadState {
        let mut load = self.paid_reaction.load.subscribe();
        let state = load.wait_for(|state| *state != LoadState::Pending).await;
        state.map(|state| *state).unwrap_or(LoadState::Failed)
    }

    /// Local-only: the value arrives through server updates.
    pub fn update_paid_reaction_anonymous(&self, value: bool) {
        self.paid_reaction.anonymous.set(value);
    }

    pub fn paid_reaction_anonymous_current(&self) -> bool {
        self.paid_reaction.anonymous.get()
    }

    pub fn paid_reaction_anonymous(&self) -> impl Stream<Item = bool> {
        stream::distinct(self.paid_reaction.anonymous.subscribe(), |value| *value)
    }
}
