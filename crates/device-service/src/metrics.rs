use lazy_static::lazy_static;
use prometheus::{opts, register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder};

lazy_static! {
    pub static ref COMMANDS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("device_service_commands_dispatched_total", "Device commands created"),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref AGENT_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("device_service_agent_messages_total", "Inbound messages from agents"),
        &["agent_kind", "message_type"]
    )
    .expect("metric can be created");

    pub static ref CONNECTED_DEVICES: IntGauge = register_int_gauge!(
        "device_service_connected_devices",
        "Currently registered direct-device agent connections"
    )
    .expect("metric can be created");

    pub static ref CONNECTED_CLIENTS: IntGauge = register_int_gauge!(
        "device_service_connected_clients",
        "Currently registered host-client agent connections"
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
