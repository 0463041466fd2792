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
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::trace;

use crate::{AppError, AppResult};

/// Degree of parallelism for a fan-out over `count` partitions: half of them,
/// rounded up, and at least one.
pub fn half_of(count: usize) -> usize {
    count.div_ceil(2).max(1)
}

/// Runs `task` for every item on the runtime, with at most `concurrency` tasks
/// in flight, and joins all of them before returning.
///
/// Results come back in input order. The first failing task fails the whole
/// fan-out. Tasks still running at that point are detached and run to
/// completion on their own, so work they started (opening a cache, catching
/// up a cursor) is not cut off halfway.
pub async fn fan_out<I, T, R, F, Fut>(items: I, concurrency: usize, task: F) -> AppResult<Vec<R>>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = AppResult<R>> + Send + 'static,
    R: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permits = permits.clone();
        let future = task(item);
        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|err| AppError::TaskFailed(err.to_string()))?;
            future.await.map(|result| (index, result))
        });
    }
    trace!("fan out {} tasks with concurrency {}", tasks.len(), concurrency);

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(|err| AppError::TaskFailed(err.to_string())) {
            Ok(Ok((index, result))) => results.push((index, result)),
            Ok(Err(err)) | Err(err) => {
                trace!("fan out failed, detaching {} running tasks", tasks.len());
                tasks.detach_all();
                return Err(err);
            }
        }
    }

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}
