// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Injected time source. The façade calls [`Clock::now`] once per
//! operation that stamps a record (`Commit`, `CreateRepo`, a deletion
//! tombstone, `Merge`), never `Timestamp::now()` directly, so tests can
//! supply a deterministic clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::content_hash::{ContentHash, DigestUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct MillisSinceEpoch(pub i64);

/// A point in time plus the UTC offset it was recorded under, following
/// the shape of `jj-lib`'s `backend::Timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Timestamp {
    pub millis_since_epoch: MillisSinceEpoch,
    pub tz_offset_minutes: i32,
}

impl ContentHash for Timestamp {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.millis_since_epoch.0.hash(state);
        self.tz_offset_minutes.hash(state);
    }
}

impl Timestamp {
    pub fn from_millis(millis: i64, tz_offset_minutes: i32) -> Self {
        Timestamp {
            millis_since_epoch: MillisSinceEpoch(millis),
            tz_offset_minutes,
        }
    }
}

/// An injected time source.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// The production clock: wall-clock time in the local offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = chrono::Local::now();
        Timestamp::from_millis(now.timestamp_millis(), now.offset().local_minus_utc() / 60)
    }
}

/// A clock for tests: starts at a fixed instant and advances by one
/// millisecond on every call, so that timestamps used as tie-breakers
/// (e.g. commit log ordering) stay strictly increasing without relying on
/// real elapsed time.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    next_millis: Arc<AtomicI64>,
}

impl SteppingClock {
    pub fn starting_at(millis: i64) -> Self {
        SteppingClock {
            next_millis: Arc::new(AtomicI64::new(millis)),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let millis = self.next_millis.fetch_add(1, Ordering::SeqCst);
        Timestamp::from_millis(millis, 0)
    }
}
