// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MessagePack codec for request and reply bodies.
//
// Structs are written as maps keyed by field name (not positional arrays)
// so that clients in other languages can build requests as plain
// dictionaries.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SlipwayError};

/// Encode a value as a MessagePack map.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| SlipwayError::Codec(format!("encode: {e}")))
}

/// Decode a MessagePack body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.is_empty() {
        return Err(SlipwayError::Codec("decode: empty message".into()));
    }
    rmp_serde::from_slice(bytes).map_err(|e| SlipwayError::Codec(format!("decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, Reply, ReplyStatus};
    use crate::types::{JobId, JobState};

    #[test]
    fn envelope_is_encoded_as_a_named_map() {
        let bytes = encode(&Envelope::simple_text("hi", true)).expect("encode");
        // fixmap marker: 0x80 | field count (type, text, wrap).
        assert_eq!(bytes[0], 0x83);
        let as_text = String::from_utf8_lossy(&bytes);
        assert!(as_text.contains("type"));
        assert!(as_text.contains("simple_text"));
    }

    #[test]
    fn image_payload_is_encoded_as_binary() {
        let bytes = encode(&Envelope::image(vec![0u8, 1, 2, 255])).expect("encode");
        // bin8 marker followed by the 4-byte length.
        let needle = [0xC4, 0x04, 0x00, 0x01, 0x02, 0xFF];
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn reply_decodes_back_to_same_value() {
        let reply = Reply::job(JobId::new(), JobState::Running);
        let bytes = encode(&reply).expect("encode");
        let decoded: Reply = decode(&bytes).expect("decode");
        assert_eq!(decoded, reply);
        assert_eq!(decoded.status, ReplyStatus::Ok);
    }

    #[test]
    fn empty_and_garbage_bodies_are_codec_errors() {
        assert!(matches!(decode::<Envelope>(&[]), Err(SlipwayError::Codec(_))));
        assert!(matches!(
            decode::<Reply>(&[0xC1, 0x00]),
            Err(SlipwayError::Codec(_))
        ));
    }
}
