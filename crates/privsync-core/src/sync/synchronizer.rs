//! Request-coalescing, optimistically-updating settings synchronizer.
//!
//! One [`SettingSynchronizer`] owns one remote settings bundle. It keeps at
//! most one reload and one write in flight:
//!
//! - `reload` calls made while a reload is pending piggyback on it. Their
//!   callbacks are queued and run in registration order once it finishes,
//!   whether it succeeded or not.
//! - `update` replaces the local bundle immediately, aborts any older write
//!   and sends the whole bundle. A write that comes back with an entitlement
//!   error is retried once with the gated fields turned off.
//!
//! Everything runs on the current thread's `LocalSet`; requests are spawned
//! with `spawn_local` and report back through a weak handle, so dropping the
//! last synchronizer handle silently discards late completions.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::variable::{Subscription, Variable};
use super::{stream, SyncStatus, SyncedSettings};
use crate::api::{SettingsTransport, TransportError};
use crate::session::EntitlementContext;

pub type Callback = Box<dyn FnOnce()>;

pub struct SettingSynchronizer<S: SyncedSettings> {
    inner: Rc<Inner<S>>,
}

impl<S: SyncedSettings> Clone for SettingSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S: SyncedSettings> {
    name: &'static str,
    transport: Rc<dyn SettingsTransport<S::Wire>>,
    entitlements: Rc<dyn EntitlementContext>,
    bundle: Variable<S>,
    status: watch::Sender<SyncStatus>,
    requests: RefCell<Requests>,
}

#[derive(Default)]
struct Requests {
    reload: Option<JoinHandle<()>>,
    reload_callbacks: Vec<Callback>,
    write: Option<PendingWrite>,
    write_generation: u64,
}

struct PendingWrite {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Allowed,
    Exhausted,
}

impl<S: SyncedSettings> SettingSynchronizer<S> {
    pub fn new(
        name: &'static str,
        transport: Rc<dyn SettingsTransport<S::Wire>>,
        entitlements: Rc<dyn EntitlementContext>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                name,
                transport,
                entitlements,
                bundle: Variable::new(S::default()),
                status: watch::channel(SyncStatus::default()).0,
                requests: RefCell::new(Requests::default()),
            }),
        }
    }

    /// Fetch the authoritative bundle from the server.
    ///
    /// `callback` runs exactly once after the pending (or newly issued)
    /// request finishes. Failure is not reported separately; inspect
    /// [`current`](Self::current) to see whether anything changed.
    pub fn reload(&self, callback: Option<Callback>) {
        self.inner.reload(callback);
    }

    /// Optimistically replace the whole bundle and push it to the server.
    pub fn update(&self, values: S) {
        self.inner.write(values, Retry::Allowed);
    }

    /// Replace the bundle from a server-side representation.
    pub fn apply(&self, wire: &S::Wire) {
        self.inner.apply(wire);
    }

    pub fn current(&self) -> S {
        self.inner.bundle.get()
    }

    pub fn subscribe(&self) -> Subscription<S> {
        self.inner.bundle.subscribe()
    }

    /// Stream of one projected field: current value first, then every change.
    pub fn field<T, F>(&self, map: F) -> impl Stream<Item = T>
    where
        F: Fn(&S) -> T,
        T: Clone + PartialEq,
    {
        stream::distinct(self.subscribe(), map)
    }

    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    /// Resolves once neither a reload nor a write is in flight.
    pub async fn settled(&self) {
        let mut status = self.inner.status.subscribe();
        let _ = status.wait_for(SyncStatus::is_idle).await;
    }
}

impl<S: SyncedSettings> Inner<S> {
    fn reload(self: &Rc<Self>, callback: Option<Callback>) {
        let mut requests = self.requests.borrow_mut();
        if let Some(callback) = callback {
            requests.reload_callbacks.push(callback);
        }
        if requests.reload.is_some() {
            tracing::debug!(
                "{}: reload already in flight, {} callbacks queued",
                self.name,
                requests.reload_callbacks.len()
            );
            return;
        }

        tracing::debug!("{}: requesting settings", self.name);
        let request = self.transport.get_settings();
        let weak = Rc::downgrade(self);
        let issued_after_write = requests.write_generation;
        requests.reload = Some(tokio::task::spawn_local(async move {
            let result = request.await;
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.finish_reload(issued_after_write, result);
            }
        }));
        drop(requests);

        self.set_status(|status| status.reload_in_flight = true);
    }

    fn finish_reload(&self, issued_after_write: u64, result: Result<S::Wire, TransportError>) {
        // A write issued while the reload was out is newer than its answer.
        let superseded = self.requests.borrow().write_generation != issued_after_write;

        match result {
            Ok(_) if superseded => {
                tracing::debug!("{}: reload answer predates a newer write, ignoring", self.name);
            }
            Ok(wire) => self.apply(&wire),
            Err(err) => {
                tracing::warn!("{}: reload failed: {}", self.name, err);
                self.set_status(|status| status.failures += 1);
            }
        }

        let callbacks = {
            let mut requests = self.requests.borrow_mut();
            requests.reload = None;
            std::mem::take(&mut requests.reload_callbacks)
        };
        self.set_status(|status| status.reload_in_flight = false);

        // No borrow is held here, so callbacks may reload or update again.
        for callback in callbacks {
            callback();
        }
    }

    fn write(self: &Rc<Self>, values: S, retry: Retry) {
        let mut requests = self.requests.borrow_mut();
        if let Some(previous) = requests.write.take() {
            previous.task.abort();
            tracing::debug!(
                "{}: write #{} superseded",
                self.name,
                previous.generation
            );
        }

        requests.write_generation += 1;
        let generation = requests.write_generation;

        let wire = values.encode(self.entitlements.as_ref());
        tracing::debug!("{}: write #{} sending {:?}", self.name, generation, wire);

        let request = self.transport.set_settings(wire);
        let weak = Rc::downgrade(self);
        let requested = values.clone();
        let task = tokio::task::spawn_local(async move {
            let result = request.await;
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.finish_write(generation, requested, retry, result);
            }
        });
        requests.write = Some(PendingWrite { generation, task });
        drop(requests);

        self.set_status(|status| status.write_in_flight = true);
        self.replace(values);
    }

    fn finish_write(
        self: &Rc<Self>,
        generation: u64,
        requested: S,
        retry: Retry,
        result: Result<S::Wire, TransportError>,
    ) {
        {
            let mut requests = self.requests.borrow_mut();
            // Superseded writes are normally aborted before they answer.
            let current = requests.write.as_ref().map(|write| write.generation);
            if current != Some(generation) {
                tracing::debug!(
                    "{}: dropping stale response for write #{}",
                    self.name,
                    generation
                );
                return;
            }
            requests.write = None;
        }

        match result {
            Ok(wire) => self.apply(&wire),
            Err(err) if retry == Retry::Allowed && err.is_entitlement_denied() => {
                tracing::info!(
                    "{}: write #{} needs an entitlement, retrying without gated fields",
                    self.name,
                    generation
                );
                self.write(requested.without_gated_fields(), Retry::Exhausted);
                return;
            }
            Err(err) => {
                tracing::warn!(
                    "{}: write #{} failed, keeping local value: {}",
                    self.name,
                    generation,
                    err
                );
                self.set_status(|status| status.failures += 1);
            }
        }

        self.set_status(|status| status.write_in_flight = false);
    }

    fn apply(&self, wire: &S::Wire) {
        if self.replace(S::decode(wire)) {
            tracing::debug!("{}: applied server settings {:?}", self.name, wire);
        }
    }

    fn replace(&self, values: S) -> bool {
        self.bundle.set(values)
    }

    fn set_status(&self, change: impl FnOnce(&mut SyncStatus)) {
        self.status.send_if_modified(|status| {
            let before = *status;
            change(status);
            *status != before
        });
    }
}

impl<S: SyncedSettings> Drop for Inner<S> {
    fn drop(&mut self) {
        let requests = self.requests.get_mut();
        if let Some(task) = requests.reload.take() {
            task.abort();
        }
        if let Some(write) = requests.write.take() {
            write.task.abort();
        }
        if !requests.reload_callbacks.is_empty() {
            tracing::debug!(
                "{}: dropping {} reload callbacks on shutdown",
                self.name,
                requests.reload_callbacks.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GlobalPrivacyFlags, PrivacySettings, UnarchiveOnNewMessage};
    use crate::session::SessionEntitlements;
    use crate::sync::test_support::{settle, ManualTransport};
    use futures::{FutureExt, StreamExt};
    use std::cell::Cell;
    use tokio::task::LocalSet;

    use crate::constants::{
        FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS, FLAG_HIDE_READ_MARKS,
        FLAG_KEEP_ARCHIVED_FOLDERS, FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM,
    };

    type Transport = ManualTransport<GlobalPrivacyFlags>;

    fn fixture(premium: bool) -> (SettingSynchronizer<PrivacySettings>, Rc<Transport>) {
        let transport = Rc::new(Transport::default());
        let session = Rc::new(SessionEntitlements::new(premium));
        let sync = SettingSynchronizer::new("test-privacy", transport.clone(), session);
        (sync, transport)
    }

    fn flags(bits: u32) -> GlobalPrivacyFlags {
        GlobalPrivacyFlags::from_bits(bits)
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> Option<Callback> {
        let log = log.clone();
        Some(Box::new(move || log.borrow_mut().push(label)))
    }

    #[tokio::test]
    async fn test_concurrent_reloads_share_one_request() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let log = Rc::new(RefCell::new(Vec::new()));

                sync.reload(recorder(&log, "first"));
                sync.reload(recorder(&log, "second"));
                sync.reload(None);
                sync.reload(recorder(&log, "third"));

                assert_eq!(transport.get_calls(), 1);
                assert!(sync.status().reload_in_flight);
                settle().await;
                assert!(log.borrow().is_empty());

                assert!(transport.resolve_get(Ok(flags(FLAG_HIDE_READ_MARKS))));
                settle().await;

                assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
                assert!(sync.current().hide_read_time);
                assert!(sync.status().is_idle());
                assert_eq!(transport.get_calls(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_failed_reload_still_runs_callbacks() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let log = Rc::new(RefCell::new(Vec::new()));

                sync.reload(recorder(&log, "a"));
                sync.reload(recorder(&log, "b"));
                transport.resolve_get(Err(TransportError::Timeout));
                settle().await;

                assert_eq!(*log.borrow(), vec!["a", "b"]);
                assert_eq!(sync.current(), PrivacySettings::default());
                assert!(!sync.status().reload_in_flight);
                assert_eq!(sync.status().failures, 1);

                // A later reload issues a fresh request.
                sync.reload(None);
                assert_eq!(transport.get_calls(), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn test_reentrant_reload_from_callback_starts_fresh_queue() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let log = Rc::new(RefCell::new(Vec::new()));

                let again = sync.clone();
                let inner_log = log.clone();
                sync.reload(Some(Box::new(move || {
                    inner_log.borrow_mut().push("outer");
                    let nested_log = inner_log.clone();
                    again.reload(Some(Box::new(move || {
                        nested_log.borrow_mut().push("nested");
                    })));
                })));

                transport.resolve_get(Ok(flags(0)));
                settle().await;
                assert_eq!(*log.borrow(), vec!["outer"]);
                assert_eq!(transport.get_calls(), 2);
                assert!(sync.status().reload_in_flight);

                transport.resolve_get(Ok(flags(0)));
                settle().await;
                assert_eq!(*log.borrow(), vec!["outer", "nested"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_update_from_reload_callback_sees_consistent_state() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);

                let writer = sync.clone();
                sync.reload(Some(Box::new(move || {
                    let mut values = writer.current();
                    values.hide_read_time = true;
                    writer.update(values);
                })));

                transport.resolve_get(Ok(flags(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS)));
                settle().await;

                let sent = transport.sent();
                assert_eq!(sent.len(), 1);
                assert_eq!(
                    sent[0].bits(),
                    FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS | FLAG_HIDE_READ_MARKS
                );
                let status = sync.status();
                assert!(!status.reload_in_flight);
                assert!(status.write_in_flight);
            })
            .await;
    }

    #[tokio::test]
    async fn test_reload_answer_does_not_overwrite_newer_write() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let log = Rc::new(RefCell::new(Vec::new()));
                sync.reload(recorder(&log, "reloaded"));

                let values = PrivacySettings {
                    hide_read_time: true,
                    ..Default::default()
                };
                sync.update(values.clone());

                transport.resolve_get(Ok(flags(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS)));
                settle().await;
                assert_eq!(sync.current(), values);
                assert_eq!(*log.borrow(), vec!["reloaded"]);

                // Reloads issued after the write apply normally.
                sync.reload(None);
                transport.resolve_get(Ok(flags(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS)));
                settle().await;
                assert!(sync.current().archive_and_mute);
                assert!(!sync.current().hide_read_time);
            })
            .await;
    }

    #[tokio::test]
    async fn test_update_is_visible_before_server_answers() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let values = PrivacySettings {
                    archive_and_mute: true,
                    unarchive_on_new_message: UnarchiveOnNewMessage::NotInFoldersUnmuted,
                    ..Default::default()
                };

                sync.update(values.clone());

                assert_eq!(sync.current(), values);
                assert_eq!(transport.pending_sets(), 1);
                assert!(sync.status().write_in_flight);
            })
            .await;
    }

    #[tokio::test]
    async fn test_server_response_corrects_optimistic_value() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                sync.update(PrivacySettings {
                    archive_and_mute: true,
                    hide_read_time: true,
                    ..Default::default()
                });

                transport.resolve_set(Ok(flags(FLAG_HIDE_READ_MARKS)));
                sync.settled().await;

                assert_eq!(
                    sync.current(),
                    PrivacySettings {
                        hide_read_time: true,
                        ..Default::default()
                    }
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_superseded_write_response_is_ignored() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let first = PrivacySettings {
                    archive_and_mute: true,
                    ..Default::default()
                };
                let second = PrivacySettings {
                    hide_read_time: true,
                    ..Default::default()
                };

                sync.update(first);
                sync.update(second.clone());
                assert_eq!(transport.set_calls(), 2);

                // The first request was aborted; answering it changes nothing.
                transport.resolve_set(Ok(flags(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS)));
                settle().await;
                assert_eq!(sync.current(), second);
                assert!(sync.status().write_in_flight);

                transport.resolve_set(Ok(flags(FLAG_HIDE_READ_MARKS)));
                sync.settled().await;
                assert_eq!(sync.current(), second);
            })
            .await;
    }

    #[tokio::test]
    async fn test_entitlement_denied_retries_once_without_gated_field() {
        LocalSet::new()
            .run_until(async {
                // The session believes it is premium; the server disagrees.
                let (sync, transport) = fixture(true);
                sync.update(PrivacySettings {
                    hide_read_time: true,
                    new_require_premium: true,
                    ..Default::default()
                });
                assert!(sync.current().new_require_premium);

                transport.resolve_set(Err(TransportError::rpc(403, "PREMIUM_ACCOUNT_REQUIRED")));
                settle().await;

                let sent = transport.sent();
                assert_eq!(sent.len(), 2);
                assert!(sent[0].is_new_noncontact_peers_require_premium());
                assert!(!sent[1].is_new_noncontact_peers_require_premium());
                assert!(sent[1].is_hide_read_marks());
                assert!(!sync.current().new_require_premium);

                transport.resolve_set(Ok(flags(FLAG_HIDE_READ_MARKS)));
                sync.settled().await;
                assert_eq!(
                    sync.current(),
                    PrivacySettings {
                        hide_read_time: true,
                        ..Default::default()
                    }
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_entitlement_retry_is_bounded() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(true);
                sync.update(PrivacySettings {
                    new_require_premium: true,
                    ..Default::default()
                });

                transport.resolve_set(Err(TransportError::rpc(403, "PREMIUM_ACCOUNT_REQUIRED")));
                settle().await;
                transport.resolve_set(Err(TransportError::rpc(403, "PREMIUM_ACCOUNT_REQUIRED")));
                sync.settled().await;

                assert_eq!(transport.set_calls(), 2);
                assert_eq!(transport.pending_sets(), 0);
                assert_eq!(sync.status().failures, 1);
                assert_eq!(sync.current(), PrivacySettings::default());
            })
            .await;
    }

    #[tokio::test]
    async fn test_failed_write_keeps_optimistic_value() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let values = PrivacySettings {
                    unarchive_on_new_message: UnarchiveOnNewMessage::None,
                    ..Default::default()
                };
                sync.update(values.clone());

                transport.resolve_set(Err(TransportError::Http("502 Bad Gateway".into())));
                sync.settled().await;

                assert_eq!(sync.current(), values);
                assert_eq!(transport.set_calls(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_unpermitted_gated_field_is_dropped_from_wire_only() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                sync.update(PrivacySettings {
                    archive_and_mute: true,
                    new_require_premium: true,
                    ..Default::default()
                });

                let sent = transport.sent();
                assert_eq!(sent[0].bits(), FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS);
                assert!(sync.current().new_require_premium);
            })
            .await;
    }

    #[tokio::test]
    async fn test_field_stream_fires_only_on_change() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let hide_read_time = sync.field(|s| s.hide_read_time);
                futures::pin_mut!(hide_read_time);
                assert_eq!(hide_read_time.next().await, Some(false));

                sync.update(PrivacySettings {
                    archive_and_mute: true,
                    ..Default::default()
                });
                assert!(hide_read_time.next().now_or_never().is_none());

                transport.resolve_set(Ok(flags(
                    FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS | FLAG_HIDE_READ_MARKS,
                )));
                sync.settled().await;
                assert_eq!(hide_read_time.next().await, Some(true));
                assert!(hide_read_time.next().now_or_never().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_field_stream_reports_optimistic_value_and_correction() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let hide_read_time = sync.field(|s| s.hide_read_time);
                futures::pin_mut!(hide_read_time);
                assert_eq!(hide_read_time.next().await, Some(false));

                sync.update(PrivacySettings {
                    hide_read_time: true,
                    ..Default::default()
                });
                transport.resolve_set(Ok(flags(0)));
                sync.settled().await;

                assert_eq!(hide_read_time.next().await, Some(true));
                assert_eq!(hide_read_time.next().await, Some(false));
                assert!(hide_read_time.next().now_or_never().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_stale_write_completion_is_dropped() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(true);
                let first = PrivacySettings {
                    new_require_premium: true,
                    ..Default::default()
                };
                let second = PrivacySettings {
                    hide_read_time: true,
                    ..Default::default()
                };
                sync.update(first.clone());
                sync.update(second.clone());

                // Completions for write #1 arriving after write #2 was issued.
                sync.inner.finish_write(
                    1,
                    first.clone(),
                    Retry::Allowed,
                    Ok(flags(FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM)),
                );
                sync.inner.finish_write(
                    1,
                    first,
                    Retry::Allowed,
                    Err(TransportError::rpc(403, "PREMIUM_ACCOUNT_REQUIRED")),
                );

                assert_eq!(sync.current(), second);
                assert_eq!(transport.set_calls(), 2);
                assert!(sync.status().write_in_flight);
                assert_eq!(sync.status().failures, 0);

                // The aborted request is still first in line.
                transport.resolve_set(Ok(flags(0)));
                transport.resolve_set(Ok(flags(FLAG_HIDE_READ_MARKS)));
                sync.settled().await;
                assert_eq!(sync.current(), second);
            })
            .await;
    }

    #[tokio::test]
    async fn test_dropping_synchronizer_discards_late_completions() {
        LocalSet::new()
            .run_until(async {
                let (sync, transport) = fixture(false);
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                sync.reload(Some(Box::new(move || flag.set(true))));
                sync.update(PrivacySettings::default());

                let mut observer = sync.subscribe();
                drop(sync);
                transport.resolve_get(Ok(flags(FLAG_KEEP_ARCHIVED_FOLDERS)));
                transport.resolve_set(Ok(flags(FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM)));
                settle().await;

                assert!(!ran.get());
                assert_eq!(*observer.current(), PrivacySettings::default());
                assert_eq!(observer.recv().await, None);
            })
            .await;
    }
}
