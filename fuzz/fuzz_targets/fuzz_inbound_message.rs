#![no_main]

use collab_client::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Binary frame path: UTF-8 validation plus classification.
    let decoded = codec::decode_inbound_bytes(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let from_text = codec::decode_inbound(s);
        assert_eq!(decoded.is_ok(), from_text.is_ok());

        // Anything that decodes must serialize back to valid JSON.
        if let Ok(msg) = from_text {
            let text = serde_json::to_string(&msg).expect("reserialize");
            let _ = codec::decode_inbound(&text);
        }
    }
});
