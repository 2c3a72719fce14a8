// parallel/mod.rs
// Distributed-memory seam: blocking collectives over a set of ranks

mod serial;
mod threaded;

pub use serial::SerialComm;
pub use threaded::ThreadComm;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PicError, PicResult};

/// Blocking collective communication between the ranks that share a grid.
///
/// Every rank must call the same sequence of collectives. There is no timeout
/// or cancellation: a rank that never arrives stalls the others.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// All-to-all exchange of raw payloads. `outgoing[r]` goes to rank `r`;
    /// the result holds one payload per source rank, in rank order.
    fn exchange_bytes(&self, outgoing: Vec<Vec<u8>>) -> PicResult<Vec<Vec<u8>>>;

    fn barrier(&self) -> PicResult<()> {
        self.exchange_bytes(vec![Vec::new(); self.size()]).map(|_| ())
    }
}

/// Typed collectives layered on [`Communicator::exchange_bytes`].
///
/// Kept apart from `Communicator` so `&dyn Communicator` can be handed to
/// species objects.
pub trait CommunicatorExt: Communicator {
    /// All-to-all exchange of typed items. Received items are concatenated in
    /// source-rank order, so the result is reproducible for a fixed decomposition.
    fn exchange<T>(&self, outgoing: Vec<Vec<T>>) -> PicResult<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if outgoing.len() != self.size() {
            return Err(PicError::Collective {
                op: "exchange",
                detail: format!("{} destinations for {} ranks", outgoing.len(), self.size()),
            });
        }
        let payloads = outgoing
            .iter()
            .map(|items| bincode::serialize(items))
            .collect::<Result<Vec<_>, _>>()?;
        let received = self.exchange_bytes(payloads)?;
        let mut out = Vec::new();
        for bytes in received {
            let mut items: Vec<T> = bincode::deserialize(&bytes)?;
            out.append(&mut items);
        }
        Ok(out)
    }

    /// Element-wise sum over all ranks, summed in rank order on every rank.
    fn all_reduce_sum_f64(&self, values: &mut [f64]) -> PicResult<()> {
        let contributions = self.all_gather(values)?;
        values.iter_mut().for_each(|v| *v = 0.0);
        for c in contributions {
            check_len("all_reduce_sum_f64", values.len(), c.len())?;
            values.iter_mut().zip(c).for_each(|(v, x)| *v += x);
        }
        Ok(())
    }

    /// Cross-rank long-integer sum.
    fn all_reduce_sum_i64(&self, values: &mut [i64]) -> PicResult<()> {
        let contributions = self.all_gather(values)?;
        values.iter_mut().for_each(|v| *v = 0);
        for c in contributions {
            check_len("all_reduce_sum_i64", values.len(), c.len())?;
            values.iter_mut().zip(c).for_each(|(v, x)| *v += x);
        }
        Ok(())
    }

    fn all_gather<T>(&self, values: &[T]) -> PicResult<Vec<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        let bytes = bincode::serialize(values)?;
        let received = self.exchange_bytes(vec![bytes; self.size()])?;
        received
            .iter()
            .map(|b| bincode::deserialize(b).map_err(PicError::from))
            .collect()
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}

fn check_len(op: &'static str, expected: usize, got: usize) -> PicResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(PicError::Collective {
            op,
            detail: format!("length mismatch: {} vs {}", expected, got),
        })
    }
}

/// Log at info level on rank 0 only.
#[macro_export]
macro_rules! root_info {
    ($comm:expr, $($arg:tt)*) => {
        if $crate::parallel::Communicator::rank($comm) == 0 {
            log::info!($($arg)*);
        }
    };
}

/// Log at debug level on rank 0 only, and only in debug builds.
#[macro_export]
macro_rules! root_debug {
    ($comm:expr, $($arg:tt)*) => {
        if cfg!(debug_assertions) && $crate::parallel::Communicator::rank($comm) == 0 {
            log::debug!($($arg)*);
        }
    };
}
