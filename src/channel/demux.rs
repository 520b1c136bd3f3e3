//! Channel demultiplexer
//!
//! Routes each parsed sample to the one sink registered for its modality.
//! The routing table is fixed once the adapter is built; modalities without
//! a registered sink are ignored, which allows subscribing to a subset.

use crate::protocol::record::{Modality, Sample};

use super::descriptor::ChannelDescriptor;
use super::error::ChannelError;
use super::sink::ChannelSink;

struct Route {
    descriptor: ChannelDescriptor,
    sink: Box<dyn ChannelSink>,
}

/// Per-modality routing table
pub struct Demultiplexer {
    routes: [Option<Route>; 4],
    opened: bool,
}

impl Demultiplexer {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self {
            routes: [None, None, None, None],
            opened: false,
        }
    }

    /// Register a sink for a modality.
    ///
    /// The descriptor's sample size must match the modality's arity, and
    /// each modality can be registered once.
    pub fn register<S>(
        &mut self,
        modality: Modality,
        descriptor: ChannelDescriptor,
        sink: S,
    ) -> Result<(), ChannelError>
    where
        S: ChannelSink + 'static,
    {
        if descriptor.sample_size != modality.arity() {
            return Err(ChannelError::ShapeMismatch {
                modality,
                expected: modality.arity(),
                declared: descriptor.sample_size,
            });
        }

        let slot = &mut self.routes[modality.index()];
        if slot.is_some() {
            return Err(ChannelError::AlreadyRegistered(modality));
        }

        tracing::debug!(modality = %modality, channel = %descriptor, "Channel registered");
        *slot = Some(Route {
            descriptor,
            sink: Box::new(sink),
        });
        Ok(())
    }

    /// Builder form of [`register`](Self::register) using the standard descriptor
    pub fn with_sink<S>(mut self, modality: Modality, sink: S) -> Result<Self, ChannelError>
    where
        S: ChannelSink + 'static,
    {
        self.register(modality, ChannelDescriptor::for_modality(modality), sink)?;
        Ok(self)
    }

    /// Forward a sample to its sink.
    ///
    /// Returns `false` if no sink is registered for the sample's modality.
    pub fn dispatch(&mut self, sample: &Sample) -> bool {
        let modality = sample.modality();
        match &mut self.routes[modality.index()] {
            Some(route) => {
                let values = sample.values();
                route
                    .sink
                    .on_sample(&route.descriptor, sample.timestamp_seconds, &values);
                true
            }
            None => {
                tracing::trace!(modality = %modality, "No channel registered, sample ignored");
                false
            }
        }
    }

    /// Check if a modality has a sink
    pub fn is_routed(&self, modality: Modality) -> bool {
        self.routes[modality.index()].is_some()
    }

    /// Descriptor registered for a modality
    pub fn descriptor(&self, modality: Modality) -> Option<&ChannelDescriptor> {
        self.routes[modality.index()].as_ref().map(|r| &r.descriptor)
    }

    /// Registered modalities, in subscription order
    pub fn modalities(&self) -> Vec<Modality> {
        Modality::ALL
            .into_iter()
            .filter(|m| self.is_routed(*m))
            .collect()
    }

    /// Notify every sink that its channel is live
    pub fn open_all(&mut self) {
        if self.opened {
            return;
        }
        for route in self.routes.iter_mut().flatten() {
            route.sink.on_open(&route.descriptor);
        }
        self.opened = true;
    }

    /// Notify every open sink that its channel is torn down
    pub fn close_all(&mut self) {
        if !self.opened {
            return;
        }
        for route in self.routes.iter_mut().flatten() {
            route.sink.on_close(&route.descriptor);
        }
        self.opened = false;
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Demultiplexer {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for Demultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demultiplexer")
            .field("modalities", &self.modalities())
            .field("opened", &self.opened)
            .finish()
    }
}
