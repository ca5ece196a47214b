#![no_main]

use libfuzzer_sys::fuzz_target;
use game_sync_protocol::utils::compression::{CompressionKind, Compressor};

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
        let codec = kind.build(64 * 1024);
        if let Ok(compressed) = codec.compress(data) {
            let _ = codec.decompress(&compressed);
        }
        // malformed input must fail cleanly within the output bound
        let _ = codec.decompress(data);
    }
});
