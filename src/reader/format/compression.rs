// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Payload decompression for the codecs a manifest can declare.

use crate::error::{Error, Result};
use crate::types::manifest::CompressionCodec;
use bytes::Bytes;
use lz4_flex::frame::FrameDecoder;
use std::io::Read;

/// Decompress `data` according to `codec`.
///
/// Errors are decode errors attributed to chunk 0; callers re-attribute them.
pub fn decompress(data: Bytes, codec: CompressionCodec) -> Result<Bytes> {
    match codec {
        CompressionCodec::None => Ok(data),
        CompressionCodec::Lz4Frame => {
            let mut decoder = FrameDecoder::new(&data[..]);
            let mut buf = Vec::with_capacity(data.len() * 2);
            decoder
                .read_to_end(&mut buf)
                .map_err(|e| Error::decode(0, format!("LZ4 decompression failed: {}", e)))?;
            Ok(Bytes::from(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz4_flex::frame::FrameEncoder;
    use std::io::Write;

    #[test]
    fn test_uncompressed_passthrough() {
        let data = Bytes::from_static(b"[[1]]");
        let out = decompress(data.clone(), CompressionCodec::None).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_lz4_frame() {
        let mut compressed = Vec::new();
        {
            let mut encoder = FrameEncoder::new(&mut compressed);
            encoder.write_all(b"[[\"a\"],[\"b\"]]").unwrap();
            encoder.finish().unwrap();
        }

        let out = decompress(Bytes::from(compressed), CompressionCodec::Lz4Frame).unwrap();
        assert_eq!(&out[..], b"[[\"a\"],[\"b\"]]");
    }

    #[test]
    fn test_invalid_lz4_is_decode_error() {
        let err = decompress(
            Bytes::from_static(b"this is not valid lz4 compressed data"),
            CompressionCodec::Lz4Frame,
        )
        .unwrap_err();
        assert!(err.to_string().contains("LZ4 decompression failed"));
    }
}
