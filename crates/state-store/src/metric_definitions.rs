// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{describe_counter, describe_histogram, Unit};

// values of label `status` in METRICS
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub(crate) const STATE_STORE_CLIENT_GET_DURATION: &str =
    "tokenpool.state_store_client.get_duration.seconds";
pub(crate) const STATE_STORE_CLIENT_CREATE_DURATION: &str =
    "tokenpool.state_store_client.create_duration.seconds";
pub(crate) const STATE_STORE_CLIENT_UPDATE_DURATION: &str =
    "tokenpool.state_store_client.update_duration.seconds";
pub(crate) const STATE_STORE_CLIENT_DELETE_DURATION: &str =
    "tokenpool.state_store_client.delete_duration.seconds";

pub(crate) const STATE_STORE_CLIENT_GET_TOTAL: &str = "tokenpool.state_store_client.get.total";
pub(crate) const STATE_STORE_CLIENT_CREATE_TOTAL: &str =
    "tokenpool.state_store_client.create.total";
pub(crate) const STATE_STORE_CLIENT_UPDATE_TOTAL: &str =
    "tokenpool.state_store_client.update.total";
pub(crate) const STATE_STORE_CLIENT_DELETE_TOTAL: &str =
    "tokenpool.state_store_client.delete.total";

pub fn describe_metrics() {
    describe_histogram!(
        STATE_STORE_CLIENT_GET_DURATION,
        Unit::Seconds,
        "State store client get request duration in seconds"
    );

    describe_histogram!(
        STATE_STORE_CLIENT_CREATE_DURATION,
        Unit::Seconds,
        "State store client create request duration in seconds"
    );

    describe_histogram!(
        STATE_STORE_CLIENT_UPDATE_DURATION,
        Unit::Seconds,
        "State store client conditional update request duration in seconds"
    );

    describe_histogram!(
        STATE_STORE_CLIENT_DELETE_DURATION,
        Unit::Seconds,
        "State store client delete request duration in seconds"
    );

    describe_counter!(
        STATE_STORE_CLIENT_GET_TOTAL,
        Unit::Count,
        "State store client get request count"
    );

    describe_counter!(
        STATE_STORE_CLIENT_CREATE_TOTAL,
        Unit::Count,
        "State store client create request count"
    );

    describe_counter!(
        STATE_STORE_CLIENT_UPDATE_TOTAL,
        Unit::Count,
        "State store client conditional update request count"
    );

    describe_counter!(
        STATE_STORE_CLIENT_DELETE_TOTAL,
        Unit::Count,
        "State store client delete request count"
    );
}
