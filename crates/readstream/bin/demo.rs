//! Demonstration of readstream features.
//!
//! Run with: `cargo run -p readstream --features demo --bin demo`
//! Set `RUST_LOG=readstream=trace` to watch cycles being dispatched and settled.

use readstream::{read, read_async, read_with, Emission, Emitter, ReadOptions, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== readstream Demo ===\n");

    demo_return_values().await?;
    demo_async_emissions().await?;
    demo_backpressure().await?;
    demo_external_end().await?;
    demo_producer_failure().await;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: one value returned per cycle
async fn demo_return_values() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 1: Return Values ---");

    let mut queue = VecDeque::from([Some(1u64), Some(2), Some(3), None]);
    let mut stream = read(move |_: Emitter<u64>| queue.pop_front().flatten());

    let mut sum = 0;
    while let Some(item) = stream.next().await {
        let value = item?;
        println!("  Received: {}", value);
        sum += value;
    }
    println!("  Sum: {} after {} producer calls\n", sum, stream.invocations());
    Ok(())
}

/// Demo 2: futures emitted in one cycle all settle before the end
async fn demo_async_emissions() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 2: Async Emissions ---");

    let mut stream = read(|emitter: Emitter<u64>| {
        for delay in [30u64, 10, 20] {
            emitter.push_future(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Some(delay)
            });
        }
        // Ends the stream, but only after the three sleeps resolve
        Emission::End
    });

    while let Some(item) = stream.next().await {
        println!("  Resolved: {}ms", item?);
    }
    println!("  Producer calls: {}\n", stream.invocations());
    Ok(())
}

/// Demo 3: the producer stops at the high-water mark
async fn demo_backpressure() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 3: Backpressure ---");

    let mut next = 0u64;
    let mut stream = read_with(ReadOptions::default().with_high_water_mark(4), move |_: Emitter<u64>| {
        next += 1;
        Some(next)
    });

    let first = stream.next().await.transpose()?;
    println!("  First value: {:?}", first);
    println!(
        "  Producer calls: {}, buffered: {}",
        stream.invocations(),
        stream.buffered_len()
    );

    stream.end();
    let rest: Vec<u64> = stream.collect::<Result<Vec<u64>, _>>().await?;
    println!("  Drained after end: {:?}\n", rest);
    Ok(())
}

/// Demo 4: ending the stream from another task mid-cycle
async fn demo_external_end() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 4: External End ---");

    let mut stream = read_async(|emitter: Emitter<u64>| async move {
        let mut tick = 0;
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tick += 1;
            if !emitter.push(tick) && emitter.is_ended() {
                break;
            }
        }
    });

    let signal = stream.end_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(55)).await;
        println!("  Ending stream from another task");
        signal.end();
    });

    while let Some(item) = stream.next().await {
        println!("  Tick: {}", item?);
    }
    println!("  Producer calls: {}\n", stream.invocations());
    Ok(())
}

/// Demo 5: a failing producer surfaces exactly one error
async fn demo_producer_failure() {
    println!("--- Demo 5: Producer Failure ---");

    let mut calls = 0;
    let stream = read(move |_: Emitter<u64>| -> Result<Option<u64>, &'static str> {
        calls += 1;
        if calls < 3 {
            Ok(Some(calls))
        } else {
            Err("sensor offline")
        }
    });

    match stream.finished().await {
        Ok(()) => println!("  Stream ended cleanly"),
        Err(err) => println!("  Stream failed: {}", err),
    }
}
