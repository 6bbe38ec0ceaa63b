use bytes::{BufMut, Bytes, BytesMut};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

const HEADER_END: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// `Content-Type` value for a `multipart/x-mixed-replace` response.
pub fn stream_content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// Encode one part of a multipart stream:
///
/// ```text
/// --{boundary}\r\n
/// Content-Type: image/jpeg\r\n
/// Content-Length: N\r\n
/// \r\n
/// <N bytes>\r\n
/// ```
pub fn encode_part(boundary: &str, payload: &[u8]) -> Bytes {
    let header = format!(
        "--{boundary}\r\nContent-Type: {JPEG_CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + payload.len() + CRLF.len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(payload);
    buf.put_slice(CRLF);
    buf.freeze()
}

/// Parse state for an incoming multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--{boundary}\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Header block announced a length; wait for exactly that many bytes.
    CollectingSized(usize),
    /// No `Content-Length`: collect bytes until the next boundary.
    CollectingUntilBoundary,
}

/// Incremental splitter for `multipart/x-mixed-replace` bodies.
///
/// Feed it chunks as they arrive from the network; it hands back every
/// complete part payload. Parts carrying `Content-Length` are cut exactly,
/// others are cut at the next boundary with the trailing `\r\n` stripped.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    scan_from: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + self.boundary.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > self.boundary.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - self.boundary.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let Some(pos) = find_subsequence(&self.buffer, HEADER_END) else {
                        break;
                    };
                    let headers = self.buffer.split_to(pos + HEADER_END.len());
                    self.scan_from = 0;
                    self.state = match content_length(&headers[..pos]) {
                        Some(len) => ParseState::CollectingSized(len),
                        None => ParseState::CollectingUntilBoundary,
                    };
                }
                ParseState::CollectingSized(len) => {
                    if self.buffer.len() < len {
                        break;
                    }
                    parts.push(self.buffer.split_to(len).freeze());
                    self.state = ParseState::SeekingBoundary;
                }
                ParseState::CollectingUntilBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer[self.scan_from..], &self.boundary) {
                        let part_end = self.scan_from + pos;
                        // Strip trailing \r\n before boundary
                        let end = if self.buffer[..part_end].ends_with(CRLF) {
                            part_end - CRLF.len()
                        } else {
                            part_end
                        };
                        let part = self.buffer.split_to(part_end);
                        let _ = self.buffer.split_to(self.boundary.len());
                        if end > 0 {
                            parts.push(part.freeze().slice(..end));
                        }
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Avoid re-scanning old data on the next chunk
                        self.scan_from = self.buffer.len().saturating_sub(self.boundary.len());
                        break;
                    }
                }
            }
        }

        parts
    }
}

fn content_length(headers: &[u8]) -> Option<usize> {
    std::str::from_utf8(headers).ok()?.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Find the position of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_layout_is_byte_exact() {
        let part = encode_part("frame", b"JPEGDATA");
        assert_eq!(
            &part[..],
            &b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\n\r\nJPEGDATA\r\n"[..]
        );
    }

    #[test]
    fn content_length_matches_payload_bytes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let part = encode_part("frame", &payload);

        let header_end = find_subsequence(&part, HEADER_END).unwrap() + HEADER_END.len();
        let headers = std::str::from_utf8(&part[..header_end]).unwrap();
        assert!(headers.contains("Content-Length: 10000\r\n"));
        assert!(part.ends_with(CRLF));
        assert_eq!(part.len() - header_end - CRLF.len(), payload.len());
        assert_eq!(&part[header_end..part.len() - CRLF.len()], &payload[..]);
    }

    #[test]
    fn parser_splits_parts_across_chunk_borders() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_part("frame", b"first"));
        // Payload containing CRLF and a fake header terminator.
        stream.extend_from_slice(&encode_part("frame", b"sec\r\n\r\nond"));
        stream.extend_from_slice(&encode_part("frame", b""));

        let mut parser = MultipartParser::new("frame");
        let mut parts = Vec::new();
        for chunk in stream.chunks(3) {
            parts.extend(parser.push(chunk));
        }
        assert_eq!(parts.len(), 3);
        assert_eq!(&parts[0][..], b"first");
        assert_eq!(&parts[1][..], b"sec\r\n\r\nond");
        assert!(parts[2].is_empty());
    }

    #[test]
    fn parser_handles_parts_without_content_length() {
        let stream = b"preamble--cam\r\nContent-Type: image/jpeg\r\n\r\nAAAA\r\n--cam\r\nContent-Type: image/jpeg\r\n\r\nBB\r\n--cam\r\n";
        let mut parser = MultipartParser::new("cam");
        let parts = parser.push(stream);
        assert_eq!(parts.len(), 2);
        assert_eq!(&parts[0][..], b"AAAA");
        assert_eq!(&parts[1][..], b"BB");
    }

    #[test]
    fn stream_content_type_names_boundary() {
        assert_eq!(
            stream_content_type("frame"),
            "multipart/x-mixed-replace; boundary=frame"
        );
    }
}
