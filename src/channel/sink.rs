//! Channel sinks
//!
//! A sink is the downstream consumer of one channel. Sinks are called from
//! the single read-loop task and never reentrantly; a sink that needs to
//! hand samples to another thread does so itself (see [`MpscSink`]).

use tokio::sync::mpsc;

use super::descriptor::ChannelDescriptor;

/// Downstream consumer of dispatched samples
pub trait ChannelSink: Send {
    /// Called when the connection starts subscribing
    fn on_open(&mut self, _descriptor: &ChannelDescriptor) {}

    /// Called once per dispatched sample
    fn on_sample(&mut self, descriptor: &ChannelDescriptor, timestamp_seconds: f64, values: &[f64]);

    /// Called during connection teardown
    fn on_close(&mut self, _descriptor: &ChannelDescriptor) {}
}

impl<F> ChannelSink for F
where
    F: FnMut(&ChannelDescriptor, f64, &[f64]) + Send,
{
    fn on_sample(&mut self, descriptor: &ChannelDescriptor, timestamp_seconds: f64, values: &[f64]) {
        self(descriptor, timestamp_seconds, values)
    }
}

/// A sample as handed across threads
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSample {
    pub device_name: String,
    pub stream_name: String,
    pub timestamp_seconds: f64,
    pub values: Vec<f64>,
}

/// Sink that forwards samples over a bounded channel.
///
/// Never blocks the read loop: when the receiver lags and the channel is
/// full, the sample is dropped and counted.
#[derive(Debug)]
pub struct MpscSink {
    tx: mpsc::Sender<ChannelSample>,
    dropped: u64,
}

impl MpscSink {
    /// Create a sink and its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChannelSample>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn new(tx: mpsc::Sender<ChannelSample>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Samples dropped because the receiver was full or gone
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl ChannelSink for MpscSink {
    fn on_sample(&mut self, descriptor: &ChannelDescriptor, timestamp_seconds: f64, values: &[f64]) {
        let sample = ChannelSample {
            device_name: descriptor.device_name.clone(),
            stream_name: descriptor.stream_name.clone(),
            timestamp_seconds,
            values: values.to_vec(),
        };

        if let Err(e) = self.tx.try_send(sample) {
            self.dropped += 1;
            tracing::trace!(
                channel = %descriptor,
                dropped = self.dropped,
                closed = matches!(e, mpsc::error::TrySendError::Closed(_)),
                "Sample dropped by sink"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::record::Modality;

    #[test]
    fn test_closure_sink() {
        let descriptor = ChannelDescriptor::for_modality(Modality::Gsr);
        let mut seen = Vec::new();
        {
            let mut sink = |_: &ChannelDescriptor, ts: f64, values: &[f64]| {
                seen.push((ts, values.to_vec()));
            };
            sink.on_open(&descriptor);
            ChannelSink::on_sample(&mut sink, &descriptor, 1.5, &[0.2]);
            sink.on_close(&descriptor);
        }
        assert_eq!(seen, vec![(1.5, vec![0.2])]);
    }

    #[test]
    fn test_mpsc_sink_forwards() {
        let descriptor = ChannelDescriptor::for_modality(Modality::Acceleration);
        let (mut sink, mut rx) = MpscSink::channel(4);

        sink.on_sample(&descriptor, 10.0, &[1.0, 2.0, 3.0]);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.device_name, "ACC-empatica_e4");
        assert_eq!(sample.stream_name, "acc-values");
        assert_eq!(sample.timestamp_seconds, 10.0);
        assert_eq!(sample.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mpsc_sink_drops_when_full() {
        let descriptor = ChannelDescriptor::for_modality(Modality::Bvp);
        let (mut sink, mut rx) = MpscSink::channel(1);

        sink.on_sample(&descriptor, 1.0, &[1.0]);
        sink.on_sample(&descriptor, 2.0, &[2.0]);
        assert_eq!(sink.dropped(), 1);

        assert_eq!(rx.try_recv().unwrap().timestamp_seconds, 1.0);
        assert!(rx.try_recv().is_err());

        drop(rx);
        sink.on_sample(&descriptor, 3.0, &[3.0]);
        assert_eq!(sink.dropped(), 2);
    }
}
