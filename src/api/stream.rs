use crate::types::StreamEvent;

const EVENT_PREFIX: &str = "data: ";

/// Reassembles a chunked response body into parsed [`StreamEvent`]s.
///
/// Fragments arrive with no alignment to line boundaries, so the parser keeps
/// a byte buffer and only decodes complete lines; a fragment may even split a
/// multi-byte character. Event lines that fail to parse are dropped rather
/// than surfaced — the stream is best effort — but drops are counted so the
/// session can report them to the debug log.
///
/// One parser instance serves exactly one request; it is not restartable.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    dropped_frames: u64,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one fragment, yielding every event completed by it.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let line_end = start + offset;
            let raw = &self.buffer[start..line_end];
            let line = String::from_utf8_lossy(raw);
            let line = line.trim_end_matches('\r');

            if let Some(payload) = line.strip_prefix(EVENT_PREFIX) {
                match serde_json::from_str::<StreamEvent>(payload) {
                    Ok(StreamEvent::Unknown) | Err(_) => self.dropped_frames += 1,
                    Ok(event) => events.push(event),
                }
            }

            start = line_end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Event lines dropped so far (malformed payload or unrecognized type).
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}
