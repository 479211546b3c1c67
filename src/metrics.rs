// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

use prometheus::*;

lazy_static! {
    pub static ref HOT_SCHEDULER_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "hotspot_scheduler_event_total",
        "Counter of hot region scheduler events.",
        &["event"]
    )
    .unwrap();
    pub static ref SCHEDULE_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["schedule"]);
    pub static ref SKIP_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["skip"]);
    pub static ref LIMIT_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["limit-exceeded"]);
    pub static ref PENDING_OP_FAIL_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["pending-op-fail"]);
    pub static ref NO_REGION_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["no-region"]);
    pub static ref UNHEALTHY_REPLICA_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["unhealthy-replica"]);
    pub static ref ABNORMAL_REPLICA_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["abnormal-replica"]);
    pub static ref SNAPSHOT_SENDER_LIMIT_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["snapshot-sender-limit"]);
    pub static ref REGION_TOO_HOT_SPLIT_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["region-too-hot-split"]);
    pub static ref NEED_SPLIT_BEFORE_SCHEDULE_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["need-split-before-move"]);
    pub static ref SEARCH_REVERT_REGIONS_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["search-revert-regions"]);
    pub static ref ALLOW_SEARCH_REVERT_REGIONS_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["allow-search-revert-regions"]);
    pub static ref NOT_SAME_ENGINE_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["not-same-engine"]);
    pub static ref CREATE_OPERATOR_FAIL_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["create-operator-fail"]);
    pub static ref NEW_OPERATOR_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["new-operator"]);
    pub static ref MOVE_PEER_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["move-peer"]);
    pub static ref MOVE_LEADER_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["move-leader"]);
    pub static ref TRANSFER_LEADER_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["transfer-leader"]);
    pub static ref SPLIT_SUCCESS_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["split-success"]);
    pub static ref NOT_FOUND_SPLIT_KEYS_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["not-found-split-keys"]);
    pub static ref HOT_BUCKET_NOT_VALID_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["hot-bucket-not-valid"]);
    pub static ref ONLY_ONE_HOT_BUCKET_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["only-one-hot-bucket"]);
    pub static ref REGION_BUCKETS_NOT_HOT_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["region-buckets-not-hot"]);
    pub static ref BUCKETS_SINGLE_HOT_SPOT_COUNTER: IntCounter =
        HOT_SCHEDULER_COUNTER_VEC.with_label_values(&["buckets-single-hot-spot"]);

    /// Admission results of source/destination store filtering, labeled by
    /// action (for example `src-store-failed-write-peer`) and store id.
    pub static ref STORE_RESULT_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "hotspot_scheduler_store_result_total",
        "Counter of store admission results during hot region scheduling.",
        &["action", "store"]
    )
    .unwrap();

    /// Candidates skipped because the involved dimensions were already
    /// uniform across stores.
    pub static ref UNIFORM_SKIP_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "hotspot_scheduler_uniform_skip_total",
        "Counter of candidates skipped for uniform store loads.",
        &["rw", "dim"]
    )
    .unwrap();

    pub static ref DIRECTION_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "hotspot_scheduler_direction_total",
        "Counter of hot region operators by direction.",
        &["type", "rw", "store", "direction", "dim"]
    )
    .unwrap();

    pub static ref BALANCE_DIRECTION_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "hotspot_scheduler_balance_direction_total",
        "Counter of operator source and target pairs.",
        &["source", "target"]
    )
    .unwrap();

    pub static ref PENDING_SUM_GAUGE_VEC: GaugeVec = register_gauge_vec!(
        "hotspot_scheduler_pending_sum",
        "Pending influence summed per store.",
        &["store", "rw", "dim"]
    )
    .unwrap();

    pub static ref PENDING_AMP_GAUGE_VEC: GaugeVec = register_gauge_vec!(
        "hotspot_scheduler_pending_amp",
        "Amplification applied to pending influence between two stores.",
        &["rw", "source", "target"]
    )
    .unwrap();

    pub static ref STORE_PEER_SUM_GAUGE_VEC: GaugeVec = register_gauge_vec!(
        "hotspot_scheduler_store_peer_sum",
        "Summed hot peer load per store, recorded when flow tracing is on.",
        &["store", "rw", "dim"]
    )
    .unwrap();

    pub static ref HOT_PEER_LOAD_HISTOGRAM_VEC: HistogramVec = register_histogram_vec!(
        "hotspot_scheduler_hot_peer_load",
        "Histogram of scheduled hot peer loads.",
        &["rw", "dim"],
        exponential_buckets(1.0, 2.0, 24).unwrap()
    )
    .unwrap();
}
