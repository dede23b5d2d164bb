use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tasklane_core::queue::sugar;
use tasklane_core::{App, AppBuilder, AppConfig, QueueConfig, Task, Work};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

/// Greets after failing a fixed number of attempts.
struct Hello {
    payload: Vec<u8>,
    remaining_failures: AtomicU32,
}

impl Hello {
    fn new(name: &str, failures: u32) -> Self {
        Self {
            payload: serde_json::json!({ "name": name }).to_string().into_bytes(),
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

impl Work for Hello {
    fn run(&self, task: &Task) {
        let p: HelloPayload = match serde_json::from_slice(&self.payload) {
            Ok(p) => p,
            Err(e) => {
                error!(task = %task.label(), error = %e, "json decode");
                task.set_success(false);
                return;
            }
        };

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            info!(task = %task.label(), attempt = task.current_attempt(), left, "intentional failure");
            task.set_success(false);
            return;
        }

        task.set_progress(100);
        println!("Hello, {}!", p.name);
    }
}

fn load_config() -> Result<AppConfig, tasklane_core::QueueError> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::from_path(path),
        None => Ok(AppConfig::default()),
    }
}

async fn run(app: &App) -> Result<(), tasklane_core::QueueError> {
    let queue = app.shared();

    // (A) chain: the first link needs two retries, the second succeeds at once
    let flaky = Task::builder()
        .name("flaky-hello")
        .work(Hello::new("retry", 2))
        .build();
    let steady = Task::named("steady-hello", Hello::new("chain", 0));
    queue.add_chained_with([flaky.clone(), steady], || println!("chain complete"))?;

    // (B) group on its own queue; one child always fails
    let demo = app.queue(QueueConfig::named("demo"))?;
    let failing = Task::builder()
        .name("always-fails")
        .maximum_retries(2)
        .work(|task: &Task| task.set_success(false))
        .build();
    let group = Task::builder().name("greetings").group([
        Task::named("alice", Hello::new("alice", 0)),
        Task::named("bob", Hello::new("bob", 1)),
        failing,
    ]);
    demo.add(group.clone())?;

    // (C) pause holds admissions until resume
    demo.pause();
    demo.add(sugar::async_wait(Duration::from_millis(50)))?;
    let snapshot = demo.snapshot();
    info!(queue = %demo.name(), pending = demo.operation_count(), "demo paused");
    println!("{}", snapshot.to_json()?);
    demo.resume();

    queue.wait_until_idle().await;
    demo.wait_until_idle().await;

    println!(
        "flaky-hello: success={} attempts={}",
        flaky.success(),
        flaky.current_attempt()
    );
    println!(
        "greetings: success={} all_children_succeeded={:?}",
        group.success(),
        group.all_children_succeeded()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = match AppBuilder::new().config(config).build() {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "app build failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&app).await {
        error!(error = %e, "demo failed");
    }
    app.shutdown().await;
}
