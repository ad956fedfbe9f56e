//! Fuzz target for envelope deserialization.
//!
//! Decoding arbitrary bytes as any wire struct must never panic,
//! only return structured errors. Successfully decoded envelopes must
//! re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealframe_proto::envelope::{
    self, Envelope, ErrorData, HeaderData, MasterTokenData, PayloadData, PayloadEnvelope,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = envelope::decode::<Envelope>(data) {
        let _ = envelope::encode(&value);
    }
    if let Ok(value) = envelope::decode::<PayloadEnvelope>(data) {
        let _ = envelope::encode(&value);
    }
    let _ = envelope::decode::<HeaderData>(data);
    let _ = envelope::decode::<ErrorData>(data);
    let _ = envelope::decode::<PayloadData>(data);
    let _ = envelope::decode::<MasterTokenData>(data);
});
