use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

pub static OPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("docsel_ops_total", "Completed operations", &["op"]).unwrap()
});

pub static OP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("docsel_op_errors_total", "Failed operations by kind", &["op", "kind"])
        .unwrap()
});

pub static OP_DURATION_SEC: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("docsel_op_duration_seconds", "Operation latency", &["op"]).unwrap()
});
