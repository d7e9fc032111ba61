//! Demo application for the Split wrapper.
//!
//! Reads its configuration from the environment, waits for the client to
//! settle, evaluates the known flags and tracks an event.
//!
//! ## Running
//!
//! ```bash
//! SPLIT_SDK_API_KEY=<key> SPLIT_LOG_LEVEL=debug cargo run --example demo
//! ```

use std::time::Duration;

use split_wrapper::{flag, global, instance, Event, ReadinessState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Split Wrapper Demo ===");
    println!();

    // Construct the process-wide client from the environment
    println!("Initializing flag client...");
    let client = instance()?;
    println!("Session key: {}", client.key());
    println!();

    let mut readiness = client.subscribe_readiness();
    let settled = tokio::time::timeout(
        Duration::from_secs(10),
        readiness.wait_for(|s| s.is_settled()),
    )
    .await
    .is_ok();
    if !settled {
        println!("Client did not settle within 10 seconds");
    }

    match client.readiness().state() {
        ReadinessState::Ready => println!("Flag definitions loaded"),
        ReadinessState::ReadyTimedOut => println!("Timed out waiting for flag definitions"),
        ReadinessState::Uninitialized => println!("Still waiting for flag definitions"),
    }
    println!();

    for flag_key in [flag::APP_VERSION, flag::IS_ASYNC_ON] {
        println!("--- {} ---", flag_key);
        println!("  Without attributes: {}", client.evaluate(flag_key));
        println!("  With attributes:    {}", client.evaluate_with_attributes(flag_key));
    }
    println!();

    println!("Async features enabled: {}", client.is_on(flag::IS_ASYNC_ON));
    println!();

    let event = Event::new("demo_run").with_property("source", "demo");
    let outcome = client.track_default_traffic(event);
    println!("Track: {}", outcome);

    // Flush and destroy before exiting
    println!("Shutting down...");
    global().teardown().await;
    println!("Done!");

    Ok(())
}
