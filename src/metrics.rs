use std::sync::LazyLock;

use prometheus::*;

static METRIC_SEARCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("cbir_search_count", "count of the searches", &["mode"]).unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "cbir_search_duration",
        "duration of the per-query search in seconds",
        &["mode"]
    )
    .unwrap()
});

static METRIC_SEARCH_CANDIDATES: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "cbir_search_candidates",
        "number of records scanned by the per-query search",
        &["mode"],
        exponential_buckets(10.0, 4.0, 8).unwrap()
    )
    .unwrap()
});

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("cbir_ingest_count", "count of the ingested images", &["kind"])
        .unwrap()
});

static METRIC_EXTRACT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("cbir_extract_duration", "duration of the descriptor extraction in seconds")
        .unwrap()
});

static METRIC_FEEDBACK_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("cbir_feedback_count", "count of the submitted feedback", &["label"])
        .unwrap()
});

static METRIC_DELETE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("cbir_delete_count", "count of the deleted images").unwrap()
});

/// 记录一次搜索，`mode` 为 `cosine`、`distance` 或 `feedback`
pub fn inc_search(mode: &str, candidates: usize, duration: f32) {
    METRIC_SEARCH_COUNT.with_label_values(&[mode]).inc();
    METRIC_SEARCH_DURATION.with_label_values(&[mode]).observe(duration as f64);
    METRIC_SEARCH_CANDIDATES.with_label_values(&[mode]).observe(candidates as f64);
}

/// 记录一次入库，`kind` 为 `extracted` 或 `registered`
pub fn inc_ingest(kind: &str) {
    METRIC_INGEST_COUNT.with_label_values(&[kind]).inc();
}

pub fn observe_extract_duration(duration: f32) {
    METRIC_EXTRACT_DURATION.observe(duration as f64);
}

pub fn inc_feedback(label: &str) {
    METRIC_FEEDBACK_COUNT.with_label_values(&[label]).inc();
}

pub fn inc_delete() {
    METRIC_DELETE_COUNT.inc();
}
