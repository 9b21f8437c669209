//! Point-to-point messaging between cooperating processes.
//!
//! A patched calculation can be spread over several processes: every
//! process (rank) computes the patch combinations it owns, the partial
//! results are gathered on rank 0, merged, and the merged results are sent
//! back to every rank. The only requirement on the transport is reliable,
//! ordered delivery of byte messages between a pair of ranks.
//!
//! [`LocalComm`] runs a group of ranks as threads of the current process,
//! which is what the tests use. Other transports (MPI, sockets) only need to
//! implement [`Communicator`].

use crate::error::Error;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};

pub trait Communicator: Sync {
    /// the rank of this process, in `0..self.size()`
    fn rank(&self) -> usize;

    /// the number of ranks
    fn size(&self) -> usize;

    /// deliver `bytes` to rank `dest`
    fn send(&self, dest: usize, bytes: Vec<u8>) -> Result<(), Error>;

    /// block until a message from rank `source` arrives
    fn recv(&self, source: usize) -> Result<Vec<u8>, Error>;
}

/// The trivial communicator of a calculation that runs in 1 process
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _bytes: Vec<u8>) -> Result<(), Error> {
        Err(Error::comm(format!("a single process can't send to rank {dest}")))
    }

    fn recv(&self, source: usize) -> Result<Vec<u8>, Error> {
        Err(Error::comm(format!("a single process can't receive from rank {source}")))
    }
}

type Message = (usize, Vec<u8>);

/// A rank of a group of in-process communicators, connected by channels
pub struct LocalComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receiver: Mutex<Receiver<Message>>,
    /// messages that arrived before they were asked for, by source
    pending: Mutex<HashMap<usize, VecDeque<Vec<u8>>>>,
}

impl LocalComm {
    /// Create a connected group of `size` ranks. Hand each one to its own
    /// thread.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| LocalComm {
                rank,
                senders: senders.clone(),
                receiver: Mutex::new(receiver),
                pending: Mutex::new(HashMap::new()),
            })
            .collect()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, dest: usize, bytes: Vec<u8>) -> Result<(), Error> {
        let sender = self
            .senders
            .get(dest)
            .ok_or_else(|| Error::comm(format!("rank {dest} doesn't exist")))?;
        sender
            .send((self.rank, bytes))
            .map_err(|_| Error::comm(format!("rank {dest} hung up")))
    }

    fn recv(&self, source: usize) -> Result<Vec<u8>, Error> {
        if source >= self.size() {
            return Err(Error::comm(format!("rank {source} doesn't exist")));
        }
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| Error::comm("poisoned message buffer"))?;
        if let Some(bytes) = pending.get_mut(&source).and_then(VecDeque::pop_front) {
            return Ok(bytes);
        }
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| Error::comm("poisoned receiver"))?;
        loop {
            let (from, bytes) = receiver
                .recv()
                .map_err(|_| Error::comm(format!("rank {source} hung up")))?;
            if from == source {
                return Ok(bytes);
            }
            pending.entry(from).or_default().push_back(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn out_of_order_messages() {
        let mut group = LocalComm::group(3);
        let c2 = group.pop().unwrap();
        let c1 = group.pop().unwrap();
        let c0 = group.pop().unwrap();
        thread::scope(|s| {
            s.spawn(|| c2.send(0, vec![2]).unwrap());
            s.spawn(|| c1.send(0, vec![1, 1]).unwrap());
            // ask for rank 1 first, regardless of arrival order
            assert_eq!(c0.recv(1).unwrap(), vec![1, 1]);
            assert_eq!(c0.recv(2).unwrap(), vec![2]);
        });
    }

    #[test]
    fn single_process_has_no_peers() {
        let comm = SingleProcess;
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        assert!(comm.send(1, vec![]).is_err());
    }
}
