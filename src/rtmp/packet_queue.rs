// src/rtmp/packet_queue.rs - Packet queue between the read and decode workers
//
// Core features:
// - Fixed capacity, FIFO, single producer / single consumer
// - Full-queue policy: the producer blocks (cancellable retry), never drops
// - Bounded waits so both sides notice cancellation promptly
// - Drain on teardown releases every unconsumed packet

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::time::Duration;

use crate::core::cancel::CancellationToken;
use crate::core::packet::Packet;

/// How long a blocked push waits before re-checking the cancellation token.
pub(crate) const PUSH_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Bounded packet queue
///
/// Both ends live in the same value so the read worker can drain whatever the decode
/// worker left behind after a connection ends.
#[derive(Clone)]
pub struct PacketQueue {
    sender: Sender<Packet>,
    receiver: Receiver<Packet>,
    capacity: usize,
}

impl PacketQueue {
    /// Creates a queue holding at most `capacity` packets. `capacity` must be non-zero;
    /// settings validation rejects zero before a queue is ever built.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Enqueue without waiting
    ///
    /// # Returns
    /// * `Ok(())` - Packet enqueued
    /// * `Err(packet)` - Queue full, ownership handed back to the caller
    pub fn try_push(&self, packet: Packet) -> Result<(), Packet> {
        match self.sender.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(packet)) | Err(TrySendError::Disconnected(packet)) => {
                Err(packet)
            }
        }
    }

    /// Enqueue, waiting for space while `cancel` is live
    ///
    /// # Returns
    /// * `true` - Packet enqueued
    /// * `false` - Cancelled while waiting; the packet has been released
    pub fn push(&self, packet: Packet, cancel: &CancellationToken) -> bool {
        let mut packet = packet;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match self.sender.send_timeout(packet, PUSH_RETRY_INTERVAL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => packet = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn try_pop(&self) -> Option<Packet> {
        self.receiver.try_recv().ok()
    }

    /// Dequeue, waiting at most `timeout` for a packet to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Packet> {
        match self.receiver.recv_timeout(timeout) {
            Ok(packet) => Some(packet),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Releases every queued packet and returns how many there were.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn make_packet(id: u8) -> Packet {
        Packet::new(0, vec![id])
    }

    fn id_of(packet: &Packet) -> u8 {
        packet.data()[0]
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new(8);
        for id in 1..=5 {
            assert!(queue.try_push(make_packet(id)).is_ok());
        }
        let popped: Vec<u8> = std::iter::from_fn(|| queue.try_pop())
            .map(|p| id_of(&p))
            .collect();
        assert_eq!(popped, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects_try_push() {
        let queue = PacketQueue::new(4);
        for id in 1..=4 {
            assert!(queue.try_push(make_packet(id)).is_ok());
        }
        assert!(queue.is_full());

        // The fifth packet is handed back untouched
        let rejected = queue.try_push(make_packet(5)).unwrap_err();
        assert_eq!(id_of(&rejected), 5);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_push_blocks_until_space() {
        let queue = PacketQueue::new(4);
        for id in 1..=4 {
            assert!(queue.try_push(make_packet(id)).is_ok());
        }

        let consumer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            consumer.try_pop().map(|p| id_of(&p))
        });

        let cancel = CancellationToken::new();
        let start = Instant::now();
        assert!(queue.push(make_packet(5), &cancel));
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(handle.join().unwrap(), Some(1));

        let rest: Vec<u8> = std::iter::from_fn(|| queue.try_pop())
            .map(|p| id_of(&p))
            .collect();
        assert_eq!(rest, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_push_gives_up_on_cancel() {
        let queue = PacketQueue::new(1);
        assert!(queue.try_push(make_packet(1)).is_ok());

        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(80));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(!queue.push(make_packet(2), &cancel));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(queue.len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue = PacketQueue::new(2);
        let start = Instant::now();
        assert!(queue.pop(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_drain_releases_everything() {
        let queue = PacketQueue::new(16);
        for id in 0..10 {
            assert!(queue.try_push(make_packet(id)).is_ok());
        }
        assert!(queue.try_pop().is_some());
        assert_eq!(queue.drain(), 9);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_cross_thread_order_preserved() {
        let queue = PacketQueue::new(3);
        let producer = queue.clone();
        let cancel = CancellationToken::new();
        let producer_cancel = cancel.clone();
        let handle = std::thread::spawn(move || {
            for id in 0..100u8 {
                assert!(producer.push(make_packet(id), &producer_cancel));
            }
        });

        let mut received = Vec::new();
        while received.len() < 100 {
            if let Some(packet) = queue.pop(Duration::from_millis(50)) {
                received.push(id_of(&packet));
            }
        }
        handle.join().unwrap();
        assert_eq!(received, (0..100u8).collect::<Vec<_>>());
    }
}
