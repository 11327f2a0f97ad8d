use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use super::timer::FlushTimer;
use super::{AdapterRegistry, AggregatorConfig, EntityId};
use crate::frame::Vcid;
use crate::Error;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    ServiceUnavailable,
}

impl AckStatus {
    /// HTTP style status code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::ServiceUnavailable => 503,
        }
    }
}

/// Acknowledgment of an [PduAggregator::aggregate_pdus] call.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AggregateAck {
    pub status: AckStatus,
    pub message: String,
}

impl AggregateAck {
    fn ok(message: String) -> Self {
        AggregateAck {
            status: AckStatus::Ok,
            message,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

type PendingKey = (EntityId, Vcid);

struct Inner {
    config: AggregatorConfig,
    adapters: Arc<AdapterRegistry>,
    pending: DashMap<PendingKey, Vec<Vec<u8>>>,
    started: AtomicBool,
    flush_lock: Mutex<()>,
}

impl Inner {
    fn flush_pdus(&self) -> usize {
        if !self.started.load(Ordering::SeqCst) {
            trace!("flush skipped; service not started");
            return 0;
        }
        let _guard = lock(&self.flush_lock);

        let mut keys: Vec<PendingKey> = self.pending.iter().map(|e| *e.key()).collect();
        if keys.is_empty() {
            trace!("flush skipped; nothing queued");
            return 0;
        }
        keys.sort_unstable();

        let mut flushed = 0;
        for (entity, vcid) in keys {
            let Some((_, pdus)) = self.pending.remove(&(entity, vcid)) else {
                continue;
            };
            if pdus.is_empty() {
                continue;
            }
            let payload = pdus.concat();
            self.send(entity, vcid, pdus.len(), &payload);
            flushed += 1;
        }
        flushed
    }

    fn send(&self, entity: EntityId, vcid: Vcid, num_pdus: usize, payload: &[u8]) {
        let Some(adapter) = self.adapters.get(entity) else {
            error!(
                entity,
                vcid,
                num_pdus,
                "no output adapter registered; dropping {} bytes",
                payload.len()
            );
            return;
        };
        let cfg = self.config.entity(entity);
        let out_vcid = cfg.vcid.unwrap_or(vcid);
        match adapter.send(payload, out_vcid, cfg.scid, cfg.apid) {
            Ok(()) => info!(
                entity,
                vcid = out_vcid,
                scid = cfg.scid,
                apid = cfg.apid,
                num_pdus,
                len = payload.len(),
                "sent aggregate payload"
            ),
            Err(source) => {
                let err = Error::SendFailure {
                    entity,
                    vcid: out_vcid,
                    source,
                };
                error!(num_pdus, len = payload.len(), "{err}");
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Batches PDUs per `(entity, vcid)` and flushes them to output adapters.
///
/// All methods take `&self`; share it between producer threads with an [Arc].
pub struct PduAggregator {
    inner: Arc<Inner>,
    timer: Mutex<Option<FlushTimer>>,
}

impl PduAggregator {
    #[must_use]
    pub fn new(config: AggregatorConfig, adapters: Arc<AdapterRegistry>) -> Self {
        PduAggregator {
            inner: Arc::new(Inner {
                config,
                adapters,
                pending: DashMap::new(),
                started: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
            }),
            timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.inner.adapters
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Start the service and its periodic flush timer.
    ///
    /// Returns `false`, doing nothing, if already started.
    pub fn start_service(&self) -> bool {
        let mut timer = lock(&self.timer);
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("aggregator already started");
            return false;
        }
        self.start_timer(&mut timer);
        info!(
            flush_interval_secs = self.inner.config.flush_interval_secs,
            "pdu aggregator started"
        );
        true
    }

    /// Cancel the flush timer, flush everything queued, and stop. Does nothing
    /// if not started.
    pub fn stop_service(&self) {
        let mut timer = lock(&self.timer);
        if !self.is_started() {
            debug!("aggregator not started; nothing to stop");
            return;
        }
        if let Some(t) = timer.take() {
            t.stop();
        }
        let flushed = self.inner.flush_pdus();
        self.inner.started.store(false, Ordering::SeqCst);
        info!(flushed, "pdu aggregator stopped");
    }

    /// Queue `pdu` for `entity` on `vcid`.
    ///
    /// If adding `pdu` would bring the pair's queued bytes to or past the entity's
    /// maximum payload size, every queued pair for every entity is flushed, the
    /// flush timer interval restarts, and `pdu` is queued after the flush.
    ///
    /// Returns [AckStatus::ServiceUnavailable] if the service is not started.
    pub fn aggregate_pdus(&self, entity: EntityId, pdu: Vec<u8>, vcid: Vcid) -> AggregateAck {
        if !self.is_started() {
            warn!(entity, vcid, "pdu rejected; aggregator not started");
            return AggregateAck {
                status: AckStatus::ServiceUnavailable,
                message: "PDU aggregation service is not started".to_string(),
            };
        }
        let key = (entity, vcid);
        let len = pdu.len();
        let max = self.inner.config.max_payload_for(entity);

        // The entry guard holds the shard lock and must be released before flushing.
        let pdu = {
            let mut pending = self.inner.pending.entry(key).or_default();
            let current: usize = pending.iter().map(Vec::len).sum();
            if pending.is_empty() || current + len < max {
                pending.push(pdu);
                trace!(entity, vcid, len, queued = current + len, "queued pdu");
                None
            } else {
                debug!(
                    entity,
                    vcid,
                    queued = current,
                    len,
                    max,
                    "payload limit reached; flushing all pending pdus"
                );
                Some(pdu)
            }
        };

        if let Some(pdu) = pdu {
            self.inner.flush_pdus();
            // Other producers may have queued for this pair since the flush.
            self.inner.pending.entry(key).or_default().push(pdu);
            if let Some(timer) = lock(&self.timer).as_ref() {
                timer.reset();
            }
        }

        AggregateAck::ok(format!(
            "queued {len} byte PDU for entity {entity} vcid {vcid}"
        ))
    }

    /// Send all queued PDUs to their adapters. Does nothing if not started.
    /// Returns the number of `(entity, vcid)` payloads flushed.
    pub fn flush_pdus(&self) -> usize {
        self.inner.flush_pdus()
    }

    /// Number of bytes queued for `entity` on `vcid`.
    #[must_use]
    pub fn pending_len(&self, entity: EntityId, vcid: Vcid) -> usize {
        self.inner
            .pending
            .get(&(entity, vcid))
            .map_or(0, |p| p.iter().map(Vec::len).sum())
    }

    /// Number of PDUs queued for `entity` on `vcid`.
    #[must_use]
    pub fn pending_count(&self, entity: EntityId, vcid: Vcid) -> usize {
        self.inner.pending.get(&(entity, vcid)).map_or(0, |p| p.len())
    }

    /// True if no PDUs are queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.pending.iter().all(|e| e.value().is_empty())
    }

    fn start_timer(&self, timer: &mut Option<FlushTimer>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        match FlushTimer::spawn(self.inner.config.flush_interval(), move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            inner.flush_pdus();
            true
        }) {
            Ok(t) => *timer = Some(t),
            Err(err) => error!("failed to start flush timer: {err}"),
        }
    }
}

impl Drop for PduAggregator {
    fn drop(&mut self) {
        // Dropping the timer signals its thread to exit.
        lock(&self.timer).take();
    }
}
