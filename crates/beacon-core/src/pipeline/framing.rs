// Request framing stage
// Turns a serialized body into an HTTP/1.1-style request frame outbound and
// strips the response framing inbound. Wire-nearest stage of the pipeline.

use bytes::{BufMut, Bytes, BytesMut};

use beacon_common::{
    FRAME_CHUNKED, FRAME_CONTENT_LENGTH, FRAME_HOST, FRAME_TRANSFER_ENCODING, HEARTBEAT_PATH,
};

use super::{PipelineError, PipelineStage, WireItem, unexpected};

const STAGE_NAME: &str = "framing";

pub struct FramingStage {
    host_header: String,
}

impl FramingStage {
    pub fn new(peer_host: &str, peer_port: u16) -> Self {
        Self {
            host_header: format!("{}:{}", peer_host, peer_port),
        }
    }
}

impl PipelineStage for FramingStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn encode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Body { bytes, chunked } = item else {
            return Err(unexpected(STAGE_NAME, "body"));
        };

        let mut frame = BytesMut::with_capacity(bytes.len() + 128);
        frame.put_slice(format!("POST {} HTTP/1.1\r\n", HEARTBEAT_PATH).as_bytes());
        frame.put_slice(format!("{}: {}\r\n", FRAME_HOST, self.host_header).as_bytes());
        if chunked {
            frame.put_slice(
                format!("{}: {}\r\n", FRAME_TRANSFER_ENCODING, FRAME_CHUNKED).as_bytes(),
            );
        } else {
            frame.put_slice(format!("{}: {}\r\n", FRAME_CONTENT_LENGTH, bytes.len()).as_bytes());
        }
        frame.put_slice(b"\r\n");
        frame.put_slice(&bytes);

        Ok(WireItem::Frame(frame.freeze()))
    }

    fn decode(&self, item: WireItem) -> Result<WireItem, PipelineError> {
        let WireItem::Frame(bytes) = item else {
            return Err(unexpected(STAGE_NAME, "frame"));
        };

        let (headers, body_start) = parse_head(&bytes)?;
        let body = bytes.slice(body_start..);

        if headers.chunked {
            return Ok(WireItem::Body {
                bytes: body,
                chunked: true,
            });
        }

        let length = headers
            .content_length
            .ok_or_else(|| PipelineError::MalformedFrame("missing Content-Length".to_string()))?;
        if body.len() != length {
            return Err(PipelineError::MalformedFrame(format!(
                "body length {} does not match Content-Length {}",
                body.len(),
                length
            )));
        }

        Ok(WireItem::Body {
            bytes: body,
            chunked: false,
        })
    }
}

struct FrameHead {
    content_length: Option<usize>,
    chunked: bool,
}

/// Parse the start line and headers of a frame, returning the byte offset of
/// the body.
fn parse_head(bytes: &[u8]) -> Result<(FrameHead, usize), PipelineError> {
    let head_end = find_head_end(bytes)
        .ok_or_else(|| PipelineError::MalformedFrame("incomplete frame head".to_string()))?;

    let head = std::str::from_utf8(&bytes[..head_end])
        .map_err(|_| PipelineError::MalformedFrame("frame head is not UTF-8".to_string()))?;

    let mut lines = head.split("\r\n");
    let start_line = lines
        .next()
        .ok_or_else(|| PipelineError::MalformedFrame("empty frame".to_string()))?;
    if !start_line.contains("HTTP/1.1") {
        return Err(PipelineError::MalformedFrame(format!(
            "unsupported start line: {}",
            start_line
        )));
    }

    let mut parsed = FrameHead {
        content_length: None,
        chunked: false,
    };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case(FRAME_CONTENT_LENGTH) {
            parsed.content_length = Some(value.parse().map_err(|_| {
                PipelineError::MalformedFrame(format!("bad Content-Length: {}", value))
            })?);
        } else if name.eq_ignore_ascii_case(FRAME_TRANSFER_ENCODING) {
            parsed.chunked = value.eq_ignore_ascii_case(FRAME_CHUNKED);
        }
    }

    Ok((parsed, head_end + 4))
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extract one complete frame from the accumulated read buffer.
///
/// Returns `None` while the buffer does not yet hold a full frame; the
/// connection read loop keeps appending until it does. Malformed heads are
/// errors (fatal for the connection).
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, PipelineError> {
    if find_head_end(buf).is_none() {
        // An absurdly long head without a terminator is malformed, not
        // pending
        if buf.len() > 16 * 1024 {
            return Err(PipelineError::MalformedFrame(
                "frame head exceeds 16KiB".to_string(),
            ));
        }
        return Ok(None);
    }

    let (head, body_start) = parse_head(&buf[..])?;

    let total = if head.chunked {
        match chunked_body_end(&buf[body_start..]) {
            Some(len) => body_start + len,
            None => return Ok(None),
        }
    } else {
        let length = head
            .content_length
            .ok_or_else(|| PipelineError::MalformedFrame("missing Content-Length".to_string()))?;
        body_start + length
    };

    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some(buf.split_to(total).freeze()))
}

/// Length of a complete chunked body, or `None` if more bytes are needed.
fn chunked_body_end(body: &[u8]) -> Option<usize> {
    let mut offset = 0;
    loop {
        let line_end = body[offset..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| offset + p)?;
        let size_text = std::str::from_utf8(&body[offset..line_end]).ok()?;
        let size = usize::from_str_radix(size_text.trim(), 16).ok()?;

        // chunk data plus its trailing CRLF
        let chunk_end = line_end + 2 + size + 2;
        if body.len() < chunk_end {
            return None;
        }
        if size == 0 {
            return Some(chunk_end);
        }
        offset = chunk_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> FramingStage {
        FramingStage::new("node-1", 8773)
    }

    #[test]
    fn test_encode_plain_body() {
        let frame = stage()
            .encode(WireItem::Body {
                bytes: Bytes::from_static(b"{\"a\":1}"),
                chunked: false,
            })
            .unwrap();

        let WireItem::Frame(bytes) = frame else {
            panic!("expected frame");
        };
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("POST /services/Heartbeat HTTP/1.1\r\n"));
        assert!(text.contains("Host: node-1:8773\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("{\"a\":1}"));
    }

    #[test]
    fn test_decode_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}";
        let body = stage()
            .decode(WireItem::Frame(Bytes::from_static(raw)))
            .unwrap();
        let WireItem::Body { bytes, chunked } = body else {
            panic!("expected body");
        };
        assert!(!chunked);
        assert_eq!(&bytes[..], b"{}");
    }

    #[test]
    fn test_decode_length_mismatch() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n{}";
        let err = stage()
            .decode(WireItem::Frame(Bytes::from_static(raw)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFrame(_)));
    }

    #[test]
    fn test_split_frame_partial() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nab"[..]);
        assert!(split_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"cdeXX");
        let frame = split_frame(&mut buf).unwrap().unwrap();
        assert!(frame.ends_with(b"abcde"));
        // Remainder stays buffered for the next frame
        assert_eq!(&buf[..], b"XX");
    }

    #[test]
    fn test_split_frame_chunked() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let mut buf = BytesMut::from(&raw[..]);
        let frame = split_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), raw.len());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_frame_chunked_incomplete() {
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nab"[..]);
        assert!(split_frame(&mut buf).unwrap().is_none());
    }
}
