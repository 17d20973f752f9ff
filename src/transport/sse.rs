//! Incremental `text/event-stream` decoding.

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt, stream};

use super::EventStream;
use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, `None` for the default `message` event.
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn message(data: impl Into<String>) -> Self {
        Self { event: None, data: data.into() }
    }
}

/// Line-oriented decoder that tolerates events split across network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(ev) = self.process_line(line) {
                out.push(ev);
            }
        }
        out
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(ev) = self.process_line(line.trim_end_matches('\r')) {
                return Some(ev);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

/// Adapts a stream of body chunks into a stream of events.
pub fn decode_event_stream<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = DecodeState { body, decoder: SseDecoder::default(), pending: VecDeque::new(), finished: false };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                return Some((Ok(ev), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => st.pending.extend(st.decoder.feed(chunk.as_ref())),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut d = SseDecoder::default();
        assert!(d.feed(b"data: {\"a\":").is_empty());
        let evs = d.feed(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(evs, vec![SseEvent::message("{\"a\":1}"), SseEvent::message("[DONE]")]);
    }

    #[test]
    fn handles_named_events_comments_and_crlf() {
        let mut d = SseDecoder::default();
        let evs = d.feed(b": keep-alive\r\nevent: delta\r\ndata: one\r\ndata: two\r\n\r\n");
        assert_eq!(evs, vec![SseEvent { event: Some("delta".into()), data: "one\ntwo".into() }]);
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut d = SseDecoder::default();
        assert!(d.feed(b"event: ping\n\n").is_empty());
        // the event name does not leak into the next event
        assert_eq!(d.feed(b"data: x\n\n"), vec![SseEvent::message("x")]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut d = SseDecoder::default();
        assert!(d.feed(b"data: tail").is_empty());
        assert_eq!(d.finish(), Some(SseEvent::message("tail")));
        assert_eq!(d.finish(), None);
    }

    #[tokio::test]
    async fn stream_adapter_yields_events_then_ends() {
        let chunks: Vec<Result<Vec<u8>, ChatError>> = vec![
            Ok(b"data: a\n".to_vec()),
            Ok(b"\ndata: b".to_vec()),
        ];
        let events: Vec<_> = decode_event_stream(stream::iter(chunks)).collect().await;
        let data: Vec<String> = events.into_iter().map(|e| e.unwrap().data).collect();
        assert_eq!(data, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stream_adapter_surfaces_body_errors() {
        let chunks: Vec<Result<Vec<u8>, ChatError>> = vec![
            Ok(b"data: a\n\n".to_vec()),
            Err(ChatError::Cancelled),
        ];
        let mut events = decode_event_stream(stream::iter(chunks));
        assert_eq!(events.next().await.unwrap().unwrap().data, "a");
        assert!(matches!(events.next().await, Some(Err(ChatError::Cancelled))));
        assert!(events.next().await.is_none());
    }
}
