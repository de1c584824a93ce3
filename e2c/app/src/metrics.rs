// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Subscribing to `emit!`-produced tracing events and turning them into
//! counters, without committing to any particular metrics exporter.
//!
//! No `prometheus` dependency here: `e2c-node` is the one that decides
//! whether to wire `MetricsCounters` into a real registry, a log line, or
//! nothing at all. This module only provides the `tracing::Layer` seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{Event, Subscriber};
use tracing_subscriber::{filter, layer, registry::LookupSpan, Layer};

/// Event counts keyed by event name (e.g. `"event::CommandDecided"`).
#[derive(Default)]
pub struct MetricsCounters {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl MetricsCounters {
    pub fn get(&self, event_name: &str) -> u64 {
        self.counts
            .lock()
            .expect("metrics mutex poisoned")
            .get(event_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn increment(&self, event_name: &'static str) {
        *self
            .counts
            .lock()
            .expect("metrics mutex poisoned")
            .entry(event_name)
            .or_insert(0) += 1;
    }
}

struct CountingLayer {
    counters: Arc<MetricsCounters>,
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: layer::Context<'_, S>) {
        self.counters.increment(event.metadata().name());
    }
}

/// Build a `tracing_subscriber::Layer` that counts every `emit!`-produced
/// event by name, plus a shared handle to read those counts back. A binary
/// attaches the layer to its subscriber and polls or exports the handle on
/// whatever cadence its chosen registry wants.
pub fn layer<S>() -> (Arc<MetricsCounters>, impl Layer<S>)
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let counters = Arc::new(MetricsCounters::default());
    let layer = CountingLayer {
        counters: counters.clone(),
    }
    .with_filter(filter::filter_fn(|md| md.name().starts_with("event::")));
    (counters, layer)
}
