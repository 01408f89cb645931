//! Prometheus metrics: request/response counts per transport, a
//! response latency histogram, and outcome counters for TSIG
//! verification and SPF evaluation.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsserved_requests_total",
        "Number of requests received, by transport.",
        &["transport"]
    )
    .expect("metric registration is infallible outside of a name collision");
    pub static ref RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsserved_responses_total",
        "Number of responses sent, by transport and RCODE.",
        &["transport", "rcode"]
    )
    .expect("metric registration is infallible outside of a name collision");
    pub static ref RESPONSE_TIME_SECONDS: HistogramVec = register_histogram_vec!(
        "dnsserved_response_time_seconds",
        "Time taken to build a response, by transport.",
        &["transport"]
    )
    .expect("metric registration is infallible outside of a name collision");
    pub static ref TSIG_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsserved_tsig_outcomes_total",
        "TSIG verification outcomes.",
        &["outcome"]
    )
    .expect("metric registration is infallible outside of a name collision");
    pub static ref SPF_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dnsserved_spf_results_total",
        "SPF evaluation results.",
        &["result"]
    )
    .expect("metric registration is infallible outside of a name collision");
}

pub fn record_request(transport: &str) {
    REQUESTS_TOTAL.with_label_values(&[transport]).inc();
}

pub fn record_response(transport: &str, rcode: u16) {
    RESPONSES_TOTAL
        .with_label_values(&[transport, &rcode.to_string()])
        .inc();
}

pub fn record_tsig_outcome(outcome: &str) {
    TSIG_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_spf_result(result: &str) {
    SPF_RESULTS_TOTAL.with_label_values(&[result]).inc();
}
