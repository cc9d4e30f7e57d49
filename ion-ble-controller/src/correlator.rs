//! Request id bookkeeping
//!
//! Ids cycle 0..=254; 255 is the lamp's "event" marker and is never handed
//! out. There is no timeout: a completion stays here until its reply arrives,
//! the id comes round again, or the session resets.

use std::collections::HashMap;

use ion_proto::{MAX_REQUEST_ID, Packet};

#[derive(Debug)]
pub struct Correlator<C> {
    next_id: u8,
    pending: HashMap<u8, C>,
}

/// Where an inbound packet belongs
#[derive(Debug)]
pub enum Routed<C> {
    /// Reply to a pending request
    Reply(C, Packet),
    /// Unsolicited event (request id 0xFF)
    Event(Packet),
    /// Nobody is waiting for this request id
    Unmatched(Packet),
}

impl<C> Default for Correlator<C> {
    fn default() -> Self {
        Self { next_id: 0, pending: HashMap::new() }
    }
}

impl<C> Correlator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `completion` under the next id. With 255 requests in flight the
    /// oldest completion under that id is replaced.
    pub fn assign(&mut self, completion: C) -> u8 {
        let id = self.next_id;
        self.pending.insert(id, completion);
        self.next_id = if id < MAX_REQUEST_ID { id + 1 } else { 0 };
        id
    }

    pub fn take(&mut self, id: u8) -> Option<C> {
        self.pending.remove(&id)
    }

    pub fn route(&mut self, packet: Packet) -> Routed<C> {
        if packet.is_event() {
            return Routed::Event(packet);
        }
        match self.take(packet.request_id) {
            Some(completion) => Routed::Reply(completion, packet),
            None => Routed::Unmatched(packet),
        }
    }

    /// Forget every pending completion and restart ids at zero
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_id = 0;
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn next_id(&self) -> u8 {
        self.next_id
    }
}
