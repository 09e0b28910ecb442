//! Config handshake tracking
//!
//! Tracks, per media kind, whether the decoder configuration has been
//! produced and transmitted (sender) or consumed (receiver). Data for a kind
//! only flows once that kind is ready.
//!
//! Sender side: data produced after the encoder reported its configuration
//! but before the config packet went out is held in a bounded FIFO and
//! flushed, in order, by `mark_sent`. Data produced before any configuration
//! exists is dropped; the next keyframe re-anchors the stream.
//!
//! Receiver side: data arriving before `mark_applied` is dropped, never
//! queued.
//!
//! All state sits behind one mutex, so a flag flip and the flush it triggers
//! are atomic with respect to concurrent `admit` calls. The `forward`
//! callbacks run under that lock and must not block.

use crate::pipeline::MediaKind;
use crate::pipeline::health::DropReason;
use crate::wire::{ConfigDescriptor, Packet};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Outcome of offering a data packet to the handshake gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Kind is ready, packet passed to `forward`
    Forwarded,
    /// Config pending, packet held until `mark_sent`
    Queued,
    /// Packet discarded
    Dropped(DropReason),
}

#[derive(Default)]
struct KindSlot {
    descriptor: Option<ConfigDescriptor>,
    ready: bool,
    pending: VecDeque<Packet>,
    /// Set when pending data had to be discarded; later deltas would
    /// reference missing frames
    skip_until_key: bool,
}

impl KindSlot {
    fn clear(&mut self) {
        *self = KindSlot::default();
    }
}

/// Per-kind "config sent / applied" bookkeeping shared by the pipeline loops
pub struct ConfigHandshake {
    slots: Mutex<[KindSlot; 2]>,
    pending_limit: usize,
}

impl ConfigHandshake {
    /// Create a handshake gate holding at most `pending_limit` packets per kind
    pub fn new(pending_limit: usize) -> Self {
        Self {
            slots: Mutex::new([KindSlot::default(), KindSlot::default()]),
            pending_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, [KindSlot; 2]> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the configuration for the descriptor's kind.
    ///
    /// Returns `false` when an identical descriptor is already recorded.
    /// A different descriptor supersedes the old one and the kind stops being
    /// ready until the new one is sent or applied. Data held for the old
    /// descriptor is discarded: it could not be decoded under the new one.
    pub fn record_config(&self, descriptor: ConfigDescriptor) -> bool {
        let mut slots = self.lock();
        let slot = &mut slots[descriptor.kind().index()];
        if slot.descriptor.as_ref() == Some(&descriptor) {
            return false;
        }
        slot.descriptor = Some(descriptor);
        slot.ready = false;
        slot.pending.clear();
        slot.skip_until_key = false;
        true
    }

    /// Last recorded descriptor of a kind
    pub fn descriptor(&self, kind: MediaKind) -> Option<ConfigDescriptor> {
        self.lock()[kind.index()].descriptor.clone()
    }

    /// Sender side: the config packet for `kind` is on the wire.
    ///
    /// Queued packets are handed to `forward` in production order before this
    /// returns. Returns how many were flushed.
    pub fn mark_sent<F>(&self, kind: MediaKind, mut forward: F) -> usize
    where
        F: FnMut(Packet),
    {
        self.mark_sent_with(kind, |packet| {
            forward(packet);
            true
        })
        .0
    }

    /// `mark_sent` for a `forward` that may refuse a packet (full queue).
    ///
    /// After a refusal the non-keyframes behind it are discarded here, and
    /// `admit` keeps discarding them until a keyframe passes. Returns
    /// (flushed, discarded), counting refusals as discarded.
    pub fn mark_sent_with<F>(&self, kind: MediaKind, mut forward: F) -> (usize, usize)
    where
        F: FnMut(Packet) -> bool,
    {
        let mut slots = self.lock();
        let slot = &mut slots[kind.index()];
        slot.ready = true;
        let flushed = slot.pending.len();
        let mut skipping = false;
        let mut discarded = 0;
        for packet in slot.pending.drain(..) {
            if skipping && !packet.is_keyframe() {
                discarded += 1;
                continue;
            }
            skipping = !forward(packet);
            if skipping {
                discarded += 1;
            }
        }
        slot.skip_until_key |= skipping;
        (flushed, discarded)
    }

    /// Receiver side: the decoder for `kind` accepted its configuration
    pub fn mark_applied(&self, kind: MediaKind) {
        self.lock()[kind.index()].ready = true;
    }

    /// Receiver side: the decoder lost its configuration
    pub fn mark_unapplied(&self, kind: MediaKind) {
        self.lock()[kind.index()].ready = false;
    }

    /// Whether data of `kind` may flow
    pub fn is_ready(&self, kind: MediaKind) -> bool {
        self.lock()[kind.index()].ready
    }

    /// Whether every kind in `present` is ready
    pub fn all_ready(&self, present: &[MediaKind]) -> bool {
        let slots = self.lock();
        present.iter().all(|kind| slots[kind.index()].ready)
    }

    /// Kinds announced so far by a configuration
    pub fn present_kinds(&self) -> Vec<MediaKind> {
        let slots = self.lock();
        MediaKind::ALL
            .into_iter()
            .filter(|kind| slots[kind.index()].descriptor.is_some())
            .collect()
    }

    /// Number of packets waiting for the config of `kind`
    pub fn pending(&self, kind: MediaKind) -> usize {
        self.lock()[kind.index()].pending.len()
    }

    /// Sender side: offer a data packet.
    ///
    /// Ready kinds pass straight to `forward`; kinds with a recorded but not
    /// yet sent config are queued; anything else is dropped.
    pub fn admit<F>(&self, packet: Packet, forward: F) -> Admission
    where
        F: FnOnce(Packet),
    {
        let mut slots = self.lock();
        let slot = &mut slots[packet.kind().index()];

        if slot.skip_until_key {
            if !packet.is_keyframe() {
                return Admission::Dropped(DropReason::QueueFull);
            }
            slot.skip_until_key = false;
        }

        if slot.ready {
            forward(packet);
            return Admission::Forwarded;
        }
        if slot.descriptor.is_none() {
            return Admission::Dropped(DropReason::NotReady);
        }
        if slot.pending.len() >= self.pending_limit {
            slot.skip_until_key = true;
            return Admission::Dropped(DropReason::QueueFull);
        }
        slot.pending.push_back(packet);
        Admission::Queued
    }

    /// Forget everything about `kind`
    pub fn reset(&self, kind: MediaKind) {
        self.lock()[kind.index()].clear();
    }

    /// Forget everything about every kind
    pub fn reset_all(&self) {
        for slot in self.lock().iter_mut() {
            slot.clear();
        }
    }
}
