//! Shorthand constructors for common tasks.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::task::Task;

/// Default concurrent task running `f`.
pub fn concurrent(f: impl Fn(&Task) + Send + Sync + 'static) -> Task {
    Task::new(f)
}

/// Group over `children`.
pub fn group(children: impl IntoIterator<Item = Task>) -> Task {
    Task::builder().group(children)
}

/// Occupies a worker for `duration`.
pub fn sync_wait(duration: Duration) -> Task {
    Task::new(move |_: &Task| std::thread::sleep(duration))
}

/// Finishes after `duration` without keeping a thread busy.
///
/// Completed by a tokio timer; outside a runtime it falls back to sleeping
/// the calling thread.
pub fn async_wait(duration: Duration) -> Task {
    Task::builder()
        .manual_finish(true)
        .work(move |task: &Task| {
            let task = task.clone();
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        tokio::time::sleep(duration).await;
                        task.finish(true);
                    });
                }
                Err(_) => {
                    std::thread::sleep(duration);
                    task.finish(true);
                }
            }
        })
        .build()
}
