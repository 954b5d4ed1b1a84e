//! Incremental server-sent-events decoder.

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `message` when absent.
    pub event: String,
    pub data: String,
}

/// Feeds raw chunks and yields complete events. Chunks may split lines,
/// events and multi-byte characters at arbitrary byte positions; only whole
/// lines are decoded.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(ev) = self.dispatch() {
                    out.push(ev);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".into()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: put\r\ndata: {\"path\":\"/\",").is_empty());
        let events = parser.push(b"\"data\":null}\r\n\r\nevent: keep-alive\ndata: null\n\n");

        assert_eq!(
            events,
            vec![
                SseEvent { event: "put".into(), data: "{\"path\":\"/\",\"data\":null}".into() },
                SseEvent { event: "keep-alive".into(), data: "null".into() },
            ]
        );
    }

    #[test]
    fn test_comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.push(b": ping\ndata: a\ndata: b\n\nevent: lonely\n\n");
        assert_eq!(events, vec![SseEvent { event: "message".into(), data: "a\nb".into() }]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let payload = "event: put\ndata: {\"path\":\"/caf\u{e9}\"}\n\n".as_bytes();
        let split = payload.iter().position(|b| *b == 0xC3).expect("lead byte") + 1;

        let mut parser = SseParser::new();
        assert!(parser.push(&payload[..split]).is_empty());
        let events = parser.push(&payload[split..]);

        assert_eq!(
            events,
            vec![SseEvent { event: "put".into(), data: "{\"path\":\"/caf\u{e9}\"}".into() }]
        );
        assert!(!events[0].data.contains('\u{FFFD}'));
    }
}
