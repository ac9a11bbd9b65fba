#![no_main]

use collab_client::protocol::ClientMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) else {
        return;
    };
    // Whatever parses as an outbound message encodes and parses back identically.
    let text = collab_client::codec::encode(&msg).expect("encode");
    let back: ClientMessage = serde_json::from_str(&text).expect("decode");
    assert_eq!(back, msg);
});
