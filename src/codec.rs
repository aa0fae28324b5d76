//! RDPCodec
//!
//! Rust Tokio Codec for communicating with a Firefox remote debugging server over TCP

use std::io;
use std::str;

use crate::error::PadreError;

use bytes::{Buf, BufMut, BytesMut};
use regex::Regex;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Longest header we'll look through for the `:` separator before giving up on the stream
const MAX_HEADER_LENGTH: usize = 512;

/// Largest packet body we'll buffer, anything announcing more is a corrupt stream
const MAX_PACKET_LENGTH: usize = 64 * 1024 * 1024;

lazy_static! {
    static ref RE_BULK_HEADER: Regex = Regex::new("^bulk (\\S+) (\\S+) (\\d+)$").unwrap();
}

/// Decodes packets from and encodes packets to the debugger server
///
/// Given bytes of the form `25:{"from":"root","tabs":[]}` it decodes the JSON object after
/// the colon once the 25 bytes announced by the header have all arrived. Bulk packets of the
/// form `bulk actor type 5:12345` aren't used by PADRE and are skipped.
#[derive(Debug, Default)]
pub struct RdpCodec {}

impl RdpCodec {
    pub fn new() -> Self {
        RdpCodec {}
    }
}

fn invalid_data(msg: String) -> PadreError {
    PadreError::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
}

/// Offset just past the body of a packet whose header ends at `colon`
fn packet_end(colon: usize, length: usize) -> Result<usize, PadreError> {
    if length > MAX_PACKET_LENGTH {
        return Err(invalid_data(format!(
            "Packet length {} over the limit of {}",
            length, MAX_PACKET_LENGTH
        )));
    }

    colon
        .checked_add(1)
        .and_then(|start| start.checked_add(length))
        .ok_or_else(|| invalid_data(format!("Packet length {} overflows", length)))
}

impl Decoder for RdpCodec {
    type Item = serde_json::Value;
    type Error = PadreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let colon = match src
                .iter()
                .take(MAX_HEADER_LENGTH)
                .position(|b| *b == b':')
            {
                Some(i) => i,
                None => {
                    if src.len() >= MAX_HEADER_LENGTH {
                        return Err(invalid_data(format!(
                            "No packet header found in '{}'",
                            String::from_utf8_lossy(&src[..MAX_HEADER_LENGTH])
                        )));
                    }
                    return Ok(None);
                }
            };

            let header = str::from_utf8(&src[..colon])
                .map_err(|e| invalid_data(format!("Can't read packet header: {}", e)))?
                .to_string();

            if let Some(caps) = RE_BULK_HEADER.captures(&header) {
                let length: usize = caps[3]
                    .parse()
                    .map_err(|e| invalid_data(format!("Bad bulk length '{}': {}", header, e)))?;

                let end = packet_end(colon, length)?;
                if src.len() < end {
                    src.reserve(end - src.len());
                    return Ok(None);
                }

                warn!(
                    "Skipping bulk packet of type {} from actor {}",
                    &caps[2], &caps[1]
                );
                src.advance(end);
                continue;
            }

            let length: usize = header
                .parse()
                .map_err(|e| invalid_data(format!("Bad packet length '{}': {}", header, e)))?;

            let end = packet_end(colon, length)?;
            if src.len() < end {
                src.reserve(end - src.len());
                return Ok(None);
            }

            src.advance(colon + 1);
            let body = src.split_to(length);

            return Ok(Some(serde_json::from_slice(&body)?));
        }
    }
}

impl Encoder<serde_json::Value> for RdpCodec {
    type Error = PadreError;

    fn encode(&mut self, packet: serde_json::Value, buf: &mut BytesMut) -> Result<(), PadreError> {
        let body = serde_json::to_string(&packet)?;
        let header = format!("{}:", body.len());

        buf.reserve(header.len() + body.len());
        buf.put(header.as_bytes());
        buf.put(body.as_bytes());

        Ok(())
    }
}
