//! Load notifications delivered to volume subscribers.

use std::sync::mpsc::{channel, Receiver, Sender};

use voxatlas_core::Error;

/// Notification emitted by a [`crate::Volume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEvent {
    /// A channel finished loading and is ready to display.
    ChannelReady(usize),
    /// Every channel is loaded. Sent once per transition into that state.
    FullyLoaded,
    /// A channel's data was rejected.
    ChannelFailed { index: usize, error: Error },
}

/// Fan-out of events to any number of receivers.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<VolumeEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<VolumeEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Delivers `event` to every live receiver and forgets dropped ones.
    pub(crate) fn emit(&mut self, event: &VolumeEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(&VolumeEvent::ChannelReady(0));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(VolumeEvent::ChannelReady(0)));
    }
}
