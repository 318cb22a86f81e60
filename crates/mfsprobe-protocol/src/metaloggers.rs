//! Metalogger list (`MATOCL_MLOG_LIST`): N * [ version:32 ip:32 ].

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::be::{u16_at, u8_at};
use crate::version::ProtocolVersion;
use crate::DecodeError;

const RECORD: &str = "metalogger list";
const ENTRY_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaloggerEntry {
    pub version: ProtocolVersion,
    pub ip: Ipv4Addr,
}

impl MetaloggerEntry {
    /// Decode the whole list. A length that is not a multiple of the entry
    /// size is rejected outright.
    pub fn decode_list(data: &[u8]) -> Result<Vec<Self>, DecodeError> {
        if data.len() % ENTRY_SIZE != 0 {
            return Err(DecodeError::UnknownLength {
                record: RECORD,
                length: data.len(),
            });
        }
        data.chunks_exact(ENTRY_SIZE)
            .map(|d| {
                Ok(MetaloggerEntry {
                    version: ProtocolVersion::new(
                        u16_at(d, 0, RECORD)?,
                        u8_at(d, 2, RECORD)?,
                        u8_at(d, 3, RECORD)?,
                    ),
                    ip: Ipv4Addr::new(d[4], d[5], d[6], d[7]),
                })
            })
            .collect()
    }
}
