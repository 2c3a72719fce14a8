// parallel/threaded.rs
// In-process ranks connected by crossbeam channels

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use super::Communicator;
use crate::error::{PicError, PicResult};

struct Envelope {
    source: usize,
    seq: u64,
    payload: Vec<u8>,
}

enum Message {
    Data(Envelope),
    /// Sent by a rank as it is dropped, after everything it ever sent.
    Departed { source: usize },
}

/// One rank of a group of ranks living in the same process.
///
/// Collectives are matched by a per-rank sequence number, so a fast rank may
/// already be sending the next collective while a slow one is still
/// receiving the current one; such early messages are stashed.
///
/// Dropping a rank tells its peers it is gone, so a rank that returns early
/// (for example with an error) makes the others fail their pending
/// collective instead of waiting forever.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    // `None` at our own index: self-delivery never goes through a channel, so
    // the receiver disconnects once every peer has gone away.
    peers: Vec<Option<Sender<Message>>>,
    inbox: Receiver<Message>,
    seq: Mutex<u64>,
    stash: Mutex<Vec<Envelope>>,
    departed: Mutex<Vec<bool>>,
}

impl ThreadComm {
    /// Build `size` connected ranks.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| channel::unbounded::<Message>()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(r, s)| if r == rank { None } else { Some(s.clone()) })
                    .collect(),
                inbox,
                seq: Mutex::new(0),
                stash: Mutex::new(Vec::new()),
                departed: Mutex::new(vec![false; size]),
            })
            .collect()
    }

    /// Run `f` on `size` ranks, one thread each, and return the per-rank results
    /// in rank order. A panic on any rank is re-raised here.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(&ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = Self::universe(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || f(&comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn next_seq(&self) -> u64 {
        let mut seq = self.seq.lock();
        let current = *seq;
        *seq += 1;
        current
    }

    /// A departed peer whose contribution to the current collective is still
    /// missing. Its messages arrive in order, so it will never come.
    fn departed_peer(&self, received: &[Option<Vec<u8>>]) -> Option<usize> {
        self.departed
            .lock()
            .iter()
            .zip(received)
            .position(|(&gone, got)| gone && got.is_none())
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        for tx in self.peers.iter().flatten() {
            // a peer that is already gone needs no notice
            let _ = tx.send(Message::Departed { source: self.rank });
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange_bytes(&self, outgoing: Vec<Vec<u8>>) -> PicResult<Vec<Vec<u8>>> {
        if outgoing.len() != self.size {
            return Err(PicError::Collective {
                op: "exchange_bytes",
                detail: format!("{} destinations for {} ranks", outgoing.len(), self.size),
            });
        }
        let seq = self.next_seq();
        let mut received: Vec<Option<Vec<u8>>> = vec![None; self.size];

        for (dst, payload) in outgoing.into_iter().enumerate() {
            match &self.peers[dst] {
                None => received[dst] = Some(payload),
                Some(tx) => tx
                    .send(Message::Data(Envelope { source: self.rank, seq, payload }))
                    .map_err(|_| PicError::Collective {
                        op: "exchange_bytes",
                        detail: format!("rank {} is gone", dst),
                    })?,
            }
        }

        let mut missing = self.size - 1;
        {
            let mut stash = self.stash.lock();
            let mut i = 0;
            while i < stash.len() {
                if stash[i].seq == seq {
                    let env = stash.swap_remove(i);
                    received[env.source] = Some(env.payload);
                    missing -= 1;
                } else {
                    i += 1;
                }
            }
        }

        while missing > 0 {
            if let Some(peer) = self.departed_peer(&received) {
                return Err(PicError::Collective {
                    op: "exchange_bytes",
                    detail: format!("rank {} left before collective {}", peer, seq),
                });
            }
            let msg = self.inbox.recv().map_err(|_| PicError::Collective {
                op: "exchange_bytes",
                detail: format!("rank {} lost its peers", self.rank),
            })?;
            match msg {
                Message::Data(env) if env.seq == seq => {
                    received[env.source] = Some(env.payload);
                    missing -= 1;
                }
                Message::Data(env) => self.stash.lock().push(env),
                Message::Departed { source } => self.departed.lock()[source] = true,
            }
        }

        Ok(received.into_iter().map(Option::unwrap_or_default).collect())
    }
}
