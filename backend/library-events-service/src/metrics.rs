use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static PUSH_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "library_events_push_connections",
        "Live push connections held by library-events-service",
    )
    .expect("failed to create library_events_push_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register library_events_push_connections");
    gauge
});

static PUSH_FRAMES_DELIVERED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "library_events_push_frames_delivered_total",
            "Frames queued on push connections, by event kind",
        ),
        &["kind"],
    )
    .expect("failed to create library_events_push_frames_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register library_events_push_frames_delivered_total");
    counter
});

static PUSH_FRAMES_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "library_events_push_frames_dropped_total",
            "Frames discarded before reaching a push connection",
        ),
        &["reason"],
    )
    .expect("failed to create library_events_push_frames_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register library_events_push_frames_dropped_total");
    counter
});

static VISIBILITY_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "library_events_visibility_transitions_total",
            "Per-item visibility classifications after a collection mutation",
        ),
        &["transition"],
    )
    .expect("failed to create library_events_visibility_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register library_events_visibility_transitions_total");
    counter
});

static AUDIENCE_RESOLUTION_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "library_events_audience_resolution_failures_total",
        "Items skipped because their audience could not be resolved",
    )
    .expect("failed to create library_events_audience_resolution_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register library_events_audience_resolution_failures_total");
    counter
});

pub fn connection_opened() {
    PUSH_CONNECTIONS.inc();
}

pub fn connection_closed() {
    PUSH_CONNECTIONS.dec();
}

pub fn frames_delivered(kind: &str, count: usize) {
    PUSH_FRAMES_DELIVERED
        .with_label_values(&[kind])
        .inc_by(count as u64);
}

pub fn frame_dropped(reason: &str) {
    PUSH_FRAMES_DROPPED.with_label_values(&[reason]).inc();
}

pub fn transition_recorded(transition: &str) {
    VISIBILITY_TRANSITIONS.with_label_values(&[transition]).inc();
}

pub fn resolution_failed() {
    AUDIENCE_RESOLUTION_FAILURES.inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
