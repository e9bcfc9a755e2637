// Chunked transfer stage
// Splits large bodies into chunk-encoded form outbound and reassembles them
// inbound. Bodies at or below the threshold pass through unchanged.

use bytes::{BufMut, Bytes, BytesMut};

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "chunking";

pub struct ChunkingStage {
    threshold: usize,
    chunk_size: usize,
}

impl ChunkingStage {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            chunk_size: threshold.max(1),
        }
    }
}

impl PipelineStage for ChunkingStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Body { bytes, chunked } = item else {
            return Err(unexpected(STAGE_NAME, "body"));
        };
        if chunked {
            return Err(PipelineError::MalformedFrame(
                "body already chunk-encoded".to_string(),
            ));
        }

        if bytes.len() <= self.threshold {
            return Ok(WireItem::Body {
                bytes,
                chunked: false,
            });
        }

        let mut encoded = BytesMut::with_capacity(bytes.len() + 64);
        for chunk in bytes.chunks(self.chunk_size) {
            encoded.put_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            encoded.put_slice(chunk);
            encoded.put_slice(b"\r\n");
        }
        encoded.put_slice(b"0\r\n\r\n");

        Ok(WireItem::Body {
            bytes: encoded.freeze(),
            chunked: true,
        })
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Body { bytes, chunked } = item else {
            return Err(unexpected(STAGE_NAME, "body"));
        };
        if !chunked {
            return Ok(WireItem::Body {
                bytes,
                chunked: false,
            });
        }

        Ok(WireItem::Body {
            bytes: reassemble(&bytes)?,
            chunked: false,
        })
    }
}

fn reassemble(encoded: &[u8]) -> Result<Bytes, PipelineError> {
    let mut body = BytesMut::with_capacity(encoded.len());
    let mut offset = 0;

    loop {
        let line_end = encoded[offset..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| offset + p)
            .ok_or_else(|| PipelineError::MalformedFrame("truncated chunk size".to_string()))?;

        let size_text = std::str::from_utf8(&encoded[offset..line_end])
            .map_err(|_| PipelineError::MalformedFrame("chunk size is not UTF-8".to_string()))?;
        let size = usize::from_str_radix(size_text.trim(), 16)
            .map_err(|_| PipelineError::MalformedFrame(format!("bad chunk size: {}", size_text)))?;

        if size == 0 {
            return Ok(body.freeze());
        }

        let data_start = line_end + 2;
        let data_end = data_start + size;
        if encoded.len() < data_end + 2 {
            return Err(PipelineError::MalformedFrame(
                "truncated chunk data".to_string(),
            ));
        }
        if &encoded[data_end..data_end + 2] != b"\r\n" {
            return Err(PipelineError::MalformedFrame(
                "chunk data missing terminator".to_string(),
            ));
        }

        body.put_slice(&encoded[data_start..data_end]);
        offset = data_end + 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(bytes: &'static [u8]) -> WireItem {
        WireItem::Body {
            bytes: Bytes::from_static(bytes),
            chunked: false,
        }
    }

    #[test]
    fn test_small_body_passes_through() {
        let stage = ChunkingStage::new(16);
        let out = stage.encode(body(b"small")).unwrap();
        let WireItem::Body { bytes, chunked } = out else {
            panic!("expected body");
        };
        assert!(!chunked);
        assert_eq!(&bytes[..], b"small");
    }

    #[test]
    fn test_large_body_roundtrip() {
        let stage = ChunkingStage::new(4);
        let out = stage
            .encode(body(b"0123456789abcdef"))
            .unwrap();
        let WireItem::Body { bytes, chunked } = out.clone() else {
            panic!("expected body");
        };
        assert!(chunked);
        assert!(bytes.ends_with(b"0\r\n\r\n"));

        let back = stage.decode(out).unwrap();
        let WireItem::Body { bytes, chunked } = back else {
            panic!("expected body");
        };
        assert!(!chunked);
        assert_eq!(&bytes[..], b"0123456789abcdef");
    }

    #[test]
    fn test_truncated_chunk_rejected() {
        let stage = ChunkingStage::new(4);
        let err = stage
            .decode(WireItem::Body {
                bytes: Bytes::from_static(b"4\r\n01"),
                chunked: true,
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFrame(_)));
    }
}
