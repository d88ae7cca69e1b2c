/*!
 * Prometheus Metrics for the Livestream Ingestor
 *
 * Exposed on `/metrics` for Prometheus scraping.
 */

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounterVec, TextEncoder, opts, register_int_counter_vec,
};

lazy_static! {
    pub static ref SESSIONS_CONNECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("ingestor_sessions_connected_total", "Total livestream sessions connected"),
        &["tenant"]
    )
    .expect("metric can be created");

    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("ingestor_events_published_total", "Total events published to the broker"),
        &["tenant", "event_kind"]
    )
    .expect("metric can be created");

    pub static ref SOURCE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("ingestor_source_errors_total", "Total external-source errors"),
        &["tenant"]
    )
    .expect("metric can be created");
}

pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered_and_increment() {
        SESSIONS_CONNECTED_TOTAL.with_label_values(&["tenant-a"]).inc();
        assert!(SESSIONS_CONNECTED_TOTAL.with_label_values(&["tenant-a"]).get() > 0);
    }
}
