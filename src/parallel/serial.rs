use super::Communicator;
use crate::error::{PicError, PicResult};

/// Single-rank communicator: every collective is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange_bytes(&self, outgoing: Vec<Vec<u8>>) -> PicResult<Vec<Vec<u8>>> {
        if outgoing.len() != 1 {
            return Err(PicError::Collective {
                op: "exchange_bytes",
                detail: format!("{} destinations for 1 rank", outgoing.len()),
            });
        }
        Ok(outgoing)
    }
}
