//! Named IPC ports: registry, reference counting, peer linkage, and the
//! receive/completion queues (`spec.md` §4.4).
//!
//! Grounded on `original_source/src/kern/ipc/port.c` for the refcount,
//! name-registry, `shutdown`/`close` bookkeeping, and service-list
//! deregistration. `connect`/`disconnect` are `KERN_ERR_UNIMPLEMENTED`
//! stubs there; both are fully implemented here per §4.4's contract.

use abi::KernError;

use crate::config::{MAX_PORTS, PORT_QUEUE_DEPTH};
use crate::name::Name;

use super::msg::{Message, MsgState};

/// Extra simultaneous peers beyond the primary one, for the "service list
/// for multi-connection service ports" `spec.md` §3 names. `spec.md` §9
/// notes the multi-peer completion discipline is only "sketched" for this
/// case — see `DESIGN.md` for the recorded decision: the field is real and
/// connect/disconnect maintain it correctly, but only the two-peer
/// send/recv/complete path `spec.md` §4.4 spells out is implemented.
const MAX_SERVICE_PEERS: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortState {
    Idle,
    Running,
    Shutdown,
    Closed,
}

struct MessageQueue {
    slots: [Message; PORT_QUEUE_DEPTH],
    head: usize,
    len: usize,
}

impl MessageQueue {
    const fn new() -> Self {
        MessageQueue { slots: [Message::EMPTY; PORT_QUEUE_DEPTH], head: 0, len: 0 }
    }

    fn is_full(&self) -> bool {
        self.len == PORT_QUEUE_DEPTH
    }

    fn push(&mut self, msg: Message) -> Result<(), KernError> {
        if self.is_full() {
            return Err(KernError::NoSpace);
        }
        let pos = (self.head + self.len) % PORT_QUEUE_DEPTH;
        self.slots[pos] = msg;
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let msg = self.slots[self.head];
        self.head = (self.head + 1) % PORT_QUEUE_DEPTH;
        self.len -= 1;
        Some(msg)
    }

    fn flush(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

pub struct Port {
    live: bool,
    owner: usize,
    state: PortState,
    refcount: u32,
    named: bool,
    peer: Option<usize>,
    service_list: [Option<usize>; MAX_SERVICE_PEERS],
    recv_queue: MessageQueue,
    completion_queue: MessageQueue,
}

impl Port {
    const fn empty() -> Self {
        Port {
            live: false,
            owner: 0,
            state: PortState::Idle,
            refcount: 0,
            named: false,
            peer: None,
            service_list: [None; MAX_SERVICE_PEERS],
            recv_queue: MessageQueue::new(),
            completion_queue: MessageQueue::new(),
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn peer(&self) -> Option<usize> {
        self.peer
    }
}

pub struct PortTable {
    ports: [Port; MAX_PORTS],
    names: [Option<(Name, usize)>; MAX_PORTS],
}

impl PortTable {
    pub fn new() -> Self {
        PortTable {
            ports: core::array::from_fn(|_| Port::empty()),
            names: [None; MAX_PORTS],
        }
    }

    pub fn port(&self, idx: usize) -> &Port {
        &self.ports[idx]
    }

    /// `create()` (`spec.md` §4.4): allocates a port owned by `owner`,
    /// refcount 1, `Idle`, unnamed.
    pub fn create(&mut self, owner: usize) -> Result<usize, KernError> {
        let idx = self.ports.iter().position(|p| !p.live).ok_or(KernError::NoMem)?;
        self.ports[idx] = Port::empty();
        self.ports[idx].live = true;
        self.ports[idx].owner = owner;
        self.ports[idx].refcount = 1;
        Ok(idx)
    }

    pub fn set_active(&mut self, idx: usize) -> Result<(), KernError> {
        let p = self.live_mut(idx)?;
        if p.state == PortState::Closed {
            return Err(KernError::Shutdown);
        }
        p.state = PortState::Running;
        Ok(())
    }

    /// `add_name` (`spec.md` §4.4): global, unique-key, case-sensitive
    /// registry. Takes a reference on behalf of the caller.
    pub fn add_name(&mut self, idx: usize, name: Name) -> Result<(), KernError> {
        if self.lookup_name_index(&name).is_some() {
            return Err(KernError::Exists);
        }
        let slot = self.names.iter().position(|n| n.is_none()).ok_or(KernError::NoMem)?;
        self.names[slot] = Some((name, idx));
        self.ports[idx].named = true;
        self.ports[idx].refcount += 1;
        Ok(())
    }

    pub fn delete_name(&mut self, name: &Name) -> Result<(), KernError> {
        let slot = self.names.iter().position(|n| n.as_ref().map(|(n, _)| n) == Some(name));
        let Some(slot) = slot else { return Err(KernError::InvalidArgs) };
        let (_, idx) = self.names[slot].take().unwrap();
        self.ports[idx].named = false;
        self.ports[idx].refcount -= 1;
        Ok(())
    }

    fn lookup_name_index(&self, name: &Name) -> Option<usize> {
        self.names.iter().flatten().find(|(n, _)| n == name).map(|(_, idx)| *idx)
    }

    /// `lookup_name` (`spec.md` §4.4): only returns ports in `Running`.
    /// Takes a reference on behalf of the caller.
    pub fn lookup_name(&mut self, name: &Name) -> Result<usize, KernError> {
        let idx = self.lookup_name_index(name).ok_or(KernError::Empty)?;
        if self.ports[idx].state != PortState::Running {
            return Err(KernError::Empty);
        }
        self.ports[idx].refcount += 1;
        Ok(idx)
    }

    /// `connect` (`spec.md` §4.4): links two ports for bidirectional
    /// communication; each takes a reference on the other. If `local`
    /// already has a primary peer, `remote` is added to the service list
    /// instead (the multi-connection service-port case `spec.md` §3
    /// names).
    pub fn connect(&mut self, local: usize, remote: usize) -> Result<(), KernError> {
        if self.ports[local].state == PortState::Closed || self.ports[remote].state == PortState::Closed {
            return Err(KernError::Shutdown);
        }
        if self.ports[local].peer.is_none() {
            self.ports[local].peer = Some(remote);
        } else {
            let slot = self.ports[local]
                .service_list
                .iter()
                .position(|s| s.is_none())
                .ok_or(KernError::NoSpace)?;
            self.ports[local].service_list[slot] = Some(remote);
        }
        if self.ports[remote].peer.is_none() {
            self.ports[remote].peer = Some(local);
        } else {
            let slot = self.ports[remote]
                .service_list
                .iter()
                .position(|s| s.is_none())
                .ok_or(KernError::NoSpace)?;
            self.ports[remote].service_list[slot] = Some(local);
        }
        self.ports[local].refcount += 1;
        self.ports[remote].refcount += 1;
        Ok(())
    }

    /// `disconnect` (`spec.md` §4.4): inverse of `connect`.
    pub fn disconnect(&mut self, local: usize, remote: usize) -> Result<(), KernError> {
        let mut found = false;
        if self.ports[local].peer == Some(remote) {
            self.ports[local].peer = None;
            found = true;
        } else if let Some(slot) = self.ports[local].service_list.iter().position(|s| *s == Some(remote)) {
            self.ports[local].service_list[slot] = None;
            found = true;
        }
        if !found {
            return Err(KernError::InvalidArgs);
        }
        if self.ports[remote].peer == Some(local) {
            self.ports[remote].peer = None;
        } else if let Some(slot) = self.ports[remote].service_list.iter().position(|s| *s == Some(local)) {
            self.ports[remote].service_list[slot] = None;
        }
        self.ports[local].refcount -= 1;
        self.ports[remote].refcount -= 1;
        Ok(())
    }

    /// `shutdown` (`spec.md` §4.4): `-> Shutdown`, unregisters the name,
    /// rejects new enqueues; already-queued messages remain deliverable.
    pub fn shutdown(&mut self, idx: usize) -> Result<(), KernError> {
        let name = self.names.iter().find(|n| matches!(n, Some((_, i)) if *i == idx)).and_then(|n| n.map(|(name, _)| name));
        if let Some(name) = name {
            self.delete_name(&name)?;
        }
        self.live_mut(idx)?.state = PortState::Shutdown;
        Ok(())
    }

    /// `close` (`spec.md` §4.4): `-> Closed`; drops peer and service
    /// links (each direction releases one reference on the other),
    /// flushes queues. A peer left referencing this port observes
    /// `Shutdown` (it is not force-closed), matching §8's boundary
    /// behavior: "Port `close` while a peer holds a reference leaves the
    /// peer in a well-defined `Shutdown` state before the final free."
    pub fn close(&mut self, idx: usize) -> Result<(), KernError> {
        if let Some(peer) = self.ports[idx].peer.take() {
            self.ports[peer].refcount = self.ports[peer].refcount.saturating_sub(1);
            if self.ports[peer].state == PortState::Running {
                self.ports[peer].state = PortState::Shutdown;
            }
        }
        for slot in 0..MAX_SERVICE_PEERS {
            if let Some(peer) = self.ports[idx].service_list[slot].take() {
                self.ports[peer].refcount = self.ports[peer].refcount.saturating_sub(1);
                if self.ports[peer].state == PortState::Running {
                    self.ports[peer].state = PortState::Shutdown;
                }
            }
        }
        let p = self.live_mut(idx)?;
        p.recv_queue.flush();
        p.completion_queue.flush();
        p.state = PortState::Closed;
        Ok(())
    }

    /// `send(local, remote_ref, msg)` (`spec.md` §4.4).
    pub fn send(&mut self, local: usize, remote: usize, payload: &[u8]) -> Result<(), KernError> {
        if payload.len() > super::msg::MAX_MSG_SIZE {
            return Err(KernError::TooBig);
        }
        if self.ports[remote].state != PortState::Running {
            return Err(KernError::Shutdown);
        }
        let mut msg = Message::EMPTY;
        msg.state = MsgState::Queued;
        msg.src = local;
        msg.dst = remote;
        msg.len = payload.len();
        msg.payload[..payload.len()].copy_from_slice(payload);
        self.ports[remote].recv_queue.push(msg)
    }

    /// `recv(local) -> msg` (`spec.md` §4.4): dequeues the head of the
    /// receive queue, or `None` if empty (not an error, per §8's boundary
    /// behavior).
    pub fn recv(&mut self, local: usize) -> Option<Message> {
        let mut msg = self.ports[local].recv_queue.pop()?;
        msg.state = MsgState::Received;
        Some(msg)
    }

    /// Moves a received message to its sender's completion queue, marking
    /// it `Completed`. The caller (the kernel's syscall/IPC layer) is
    /// responsible for then signaling `PORT_RXREADY` to the sender's task.
    pub fn set_msg_completed(&mut self, mut msg: Message) -> Result<(), KernError> {
        msg.state = MsgState::Completed;
        let sender = msg.src;
        self.ports[sender].completion_queue.push(msg)
    }

    pub fn recv_completion(&mut self, local: usize) -> Option<Message> {
        let mut msg = self.ports[local].completion_queue.pop()?;
        msg.state = MsgState::Finished;
        Some(msg)
    }

    /// Releases the owner's reference. Only actually frees the slot once
    /// the refcount has dropped to exactly what the call itself removes
    /// (`spec.md` §4.4: "A port may not be destroyed with refcount > 1").
    pub fn destroy(&mut self, idx: usize) -> Result<(), KernError> {
        let p = self.live_mut(idx)?;
        assert!(p.refcount <= 1, "port destroyed with outstanding references");
        *p = Port::empty();
        Ok(())
    }

    fn live_mut(&mut self, idx: usize) -> Result<&mut Port, KernError> {
        let p = &mut self.ports[idx];
        if !p.live {
            return Err(KernError::InvalidArgs);
        }
        Ok(p)
    }
}

impl Default for PortTable {
    fn default() -> Self {
        Self::new()
    }
}
