//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_active` (gauge): relays currently running
//! - `relay_finished_total` (counter): finished relays by outcome
//! - `relay_bytes_total` (counter): bytes relayed by direction

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Marks one relay as active until dropped.
#[must_use = "the relay counts as active only while the guard lives"]
#[derive(Debug)]
pub struct ActiveRelay(());

impl Drop for ActiveRelay {
    fn drop(&mut self) {
        ::metrics::gauge!("relay_active").decrement(1.0);
    }
}

pub fn relay_started() -> ActiveRelay {
    ::metrics::gauge!("relay_active").increment(1.0);
    ActiveRelay(())
}

pub fn relay_finished(success: bool, uplink_bytes: u64, downlink_bytes: u64) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("relay_finished_total", "outcome" => outcome).increment(1);
    ::metrics::counter!("relay_bytes_total", "direction" => "uplink").increment(uplink_bytes);
    ::metrics::counter!("relay_bytes_total", "direction" => "downlink").increment(downlink_bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use ::metrics::{
        Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };

    #[derive(Default)]
    struct GaugeValue(Mutex<f64>);

    impl GaugeFn for GaugeValue {
        fn increment(&self, value: f64) {
            *self.0.lock().unwrap() += value;
        }

        fn decrement(&self, value: f64) {
            *self.0.lock().unwrap() -= value;
        }

        fn set(&self, value: f64) {
            *self.0.lock().unwrap() = value;
        }
    }

    /// Routes every gauge to one shared value.
    #[derive(Default)]
    struct GaugeRecorder {
        value: Arc<GaugeValue>,
    }

    impl GaugeRecorder {
        fn value(&self) -> f64 {
            *self.value.0.lock().unwrap()
        }
    }

    impl Recorder for GaugeRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::from_arc(self.value.clone())
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn dropped_relay_leaves_active_gauge() {
        let recorder = GaugeRecorder::default();
        ::metrics::with_local_recorder(&recorder, || {
            let first = relay_started();
            let second = relay_started();
            assert_eq!(recorder.value(), 2.0);

            drop(first);
            assert_eq!(recorder.value(), 1.0);

            relay_finished(false, 10, 20);
            assert_eq!(recorder.value(), 1.0, "finishing does not touch the gauge");
            drop(second);
        });
        assert_eq!(recorder.value(), 0.0);
    }
}
