// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::AppResult;

/// Point in time a suspending operation has to finish by. `None` waits forever.
pub type Deadline = Option<Instant>;

pub const NO_TIMEOUT: Deadline = None;

pub fn deadline_after(timeout: Duration) -> Deadline {
    Some(Instant::now() + timeout)
}

/// Runs `fut` to completion or fails with `AppError::Timeout` once `deadline`
/// passes. On timeout `fut` is dropped, it never resumes.
pub async fn with_deadline<F: Future>(deadline: Deadline, fut: F) -> AppResult<F::Output> {
    match deadline {
        Some(deadline) => Ok(tokio::time::timeout_at(deadline, fut).await?),
        None => Ok(fut.await),
    }
}
