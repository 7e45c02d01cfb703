//! Byte channels between the local party and each peer, multiplexed over a single transport.
//!
//! Every message on the transport starts with a tag byte that selects the channel:
//!
//! | tag    | channel                        |
//! |--------|--------------------------------|
//! | `0x00` | setup (hash exchange)          |
//! | `0x01` | engine channel [`Channel::A`]  |
//! | `0x02` | engine channel [`Channel::B`]  |
//!
//! Received bytes are queued per peer and channel. Reads take an exact number of bytes and wait
//! until enough bytes have arrived, independently of how the sender split them into messages.

use std::{
    collections::VecDeque,
    pin::pin,
    sync::{Mutex, PoisonError},
};

use tokio::sync::Notify;

/// One of the two logical byte channels the engine can use between two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The first engine channel.
    A,
    /// The second engine channel.
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Tag {
    Setup,
    Engine(Channel),
}

impl Tag {
    const COUNT: usize = 3;

    pub(crate) fn byte(self) -> u8 {
        match self {
            Tag::Setup => 0x00,
            Tag::Engine(Channel::A) => 0x01,
            Tag::Engine(Channel::B) => 0x02,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Tag::Setup),
            0x01 => Some(Tag::Engine(Channel::A)),
            0x02 => Some(Tag::Engine(Channel::B)),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self.byte() as usize
    }
}

/// Violations of the message framing between parties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A message was received from a name that is not one of the other parties.
    #[error("received a message from unknown party `{0}`")]
    UnknownPeer(String),
    /// A message without a tag byte was received.
    #[error("received an empty message from `{0}`")]
    EmptyMessage(String),
    /// A message was received with a tag byte that does not select any channel.
    #[error("received a message from `{from}` with unknown channel tag {tag:#04x}")]
    UnknownChannel {
        /// The sending party.
        from: String,
        /// The offending tag byte.
        tag: u8,
    },
    /// The engine tried to talk to a party index that is not another party.
    #[error("party index {0} does not refer to another party")]
    InvalidParty(usize),
}

#[derive(Debug, Default)]
struct Queue {
    bytes: Mutex<VecDeque<u8>>,
    notify: Notify,
}

/// Incoming byte queues, one per peer and tag.
#[derive(Debug)]
pub(crate) struct ChannelDemux {
    queues: Vec<Queue>,
}

impl ChannelDemux {
    pub(crate) fn new(parties: usize) -> Self {
        let mut queues = Vec::with_capacity(parties * Tag::COUNT);
        queues.resize_with(parties * Tag::COUNT, Queue::default);
        Self { queues }
    }

    fn queue(&self, peer: usize, tag: Tag) -> &Queue {
        &self.queues[peer * Tag::COUNT + tag.index()]
    }

    /// Appends received bytes and wakes up readers of the queue.
    pub(crate) fn push(&self, peer: usize, tag: Tag, bytes: &[u8]) {
        let queue = self.queue(peer, tag);
        queue
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(bytes);
        queue.notify.notify_waiters();
    }

    /// Takes exactly `len` bytes from the queue, waiting until enough bytes have arrived.
    pub(crate) async fn pop(&self, peer: usize, tag: Tag, len: usize) -> Vec<u8> {
        let queue = self.queue(peer, tag);
        loop {
            let mut notified = pin!(queue.notify.notified());
            notified.as_mut().enable();
            {
                let mut bytes = queue.bytes.lock().unwrap_or_else(PoisonError::into_inner);
                if bytes.len() >= len {
                    return bytes.drain(..len).collect();
                }
            }
            notified.await;
        }
    }

    /// The number of bytes currently waiting in the queue.
    #[cfg(test)]
    pub(crate) fn queued(&self, peer: usize, tag: Tag) -> usize {
        self.queue(peer, tag)
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn tags_round_trip() {
        for tag in [Tag::Setup, Tag::Engine(Channel::A), Tag::Engine(Channel::B)] {
            assert_eq!(Tag::from_byte(tag.byte()), Some(tag));
        }
        assert_eq!(Tag::from_byte(3), None);
    }

    #[tokio::test]
    async fn reads_are_fifo_across_messages() {
        let demux = ChannelDemux::new(2);
        let a = Tag::Engine(Channel::A);
        demux.push(1, a, &[1, 2, 3]);
        demux.push(1, a, &[4, 5]);
        assert_eq!(demux.pop(1, a, 2).await, vec![1, 2]);
        assert_eq!(demux.pop(1, a, 3).await, vec![3, 4, 5]);
        assert_eq!(demux.queued(1, a), 0);
        assert_eq!(demux.pop(1, a, 0).await, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let demux = ChannelDemux::new(3);
        demux.push(1, Tag::Engine(Channel::A), &[1]);
        demux.push(2, Tag::Engine(Channel::A), &[2]);
        demux.push(1, Tag::Engine(Channel::B), &[3]);
        demux.push(1, Tag::Setup, &[4]);
        assert_eq!(demux.pop(2, Tag::Engine(Channel::A), 1).await, vec![2]);
        assert_eq!(demux.pop(1, Tag::Setup, 1).await, vec![4]);
        assert_eq!(demux.pop(1, Tag::Engine(Channel::B), 1).await, vec![3]);
        assert_eq!(demux.pop(1, Tag::Engine(Channel::A), 1).await, vec![1]);
    }

    #[tokio::test]
    async fn pop_waits_for_enough_bytes() {
        let demux = Arc::new(ChannelDemux::new(2));
        let tag = Tag::Engine(Channel::B);
        let reader = tokio::spawn({
            let demux = Arc::clone(&demux);
            async move { demux.pop(0, tag, 4).await }
        });
        demux.push(0, tag, &[9]);
        tokio::task::yield_now().await;
        demux.push(0, tag, &[8, 7]);
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());
        demux.push(0, tag, &[6, 5]);
        let bytes = timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader timed out")
            .expect("reader panicked");
        assert_eq!(bytes, vec![9, 8, 7, 6]);
        assert_eq!(demux.queued(0, tag), 1);
    }
}
