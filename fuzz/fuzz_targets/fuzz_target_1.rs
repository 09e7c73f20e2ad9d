#![no_main]

use libfuzzer_sys::fuzz_target;
use qortal_lite_protocol::core::frame;
use qortal_lite_protocol::core::MessageType;
use qortal_lite_protocol::messages;

fuzz_target!(|data: &[u8]| {
    // Framing must never panic or over-read, whatever arrives on the socket
    let synced = frame::resync(data);
    if let Ok(frame::Parsed::Frame { frame, total_length }) = frame::parse(synced) {
        assert!(total_length <= synced.len());
        if let Some(message_type) = MessageType::from_code(frame.message_type) {
            let _ = messages::try_decode_payload(message_type, &frame.payload);
        }
    }

    // Decoders see raw payloads too; the first byte picks the type
    if let Some((&selector, payload)) = data.split_first() {
        if let Some(message_type) = MessageType::from_code(u32::from(selector)) {
            let _ = messages::try_decode_payload(message_type, payload);
        }
    }
});
