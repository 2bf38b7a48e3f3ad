//! Peer context for multi-peer logging
//!
//! Several peers often share one process (simulations, tests). Running each
//! peer's tasks inside a [`peer_span`] tags every event they emit with the
//! peer's id and label; the JSONL layer writes the active span's fields
//! alongside each event.

use coscene_core::PeerId;
use tracing::Span;

/// Span tagging everything inside it with a peer's id and label
///
/// ```ignore
/// tokio::spawn(run_peer().instrument(peer_span(&peer, "peer-1")));
/// ```
pub fn peer_span(peer: &PeerId, label: &str) -> Span {
    tracing::info_span!("peer", peer_id = %peer.short_id(), label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonFields;
    use crate::layers::jsonl_layer;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn lines(buf: &SharedBuf) -> Vec<serde_json::Value> {
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_events_in_peer_span_carry_peer_fields() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let layer = jsonl_layer::<Registry, _>(move || writer.clone(), &JsonFields::default());
        let subscriber = Registry::default().with(layer);
        let peer = PeerId::generate();

        tracing::subscriber::with_default(subscriber, || {
            let _entered = peer_span(&peer, "peer-1").entered();
            tracing::info!("Spawned entity");
        });

        let events = lines(&buf);
        assert_eq!(events.len(), 1);
        let span = &events[0]["span"];
        assert_eq!(span["name"], "peer");
        assert_eq!(span["peer_id"], peer.short_id());
        assert_eq!(span["label"], "peer-1");
    }

    #[test]
    fn test_events_outside_peer_span_have_no_peer() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let layer = jsonl_layer::<Registry, _>(move || writer.clone(), &JsonFields::default());

        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::info!("No peer here");
        });

        let events = lines(&buf);
        assert_eq!(events.len(), 1);
        assert!(events[0].get("span").is_none());
    }
}
