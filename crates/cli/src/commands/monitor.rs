//! `slothtop monitor`: stream hardware samples to the terminal.

use std::time::Duration;

use slothtop_monitor::MonitorKind;
use tokio::sync::broadcast::error::RecvError;

use super::Runtime;

pub async fn run(kind: &str, seconds: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let kind: MonitorKind = kind.parse()?;
    let runtime = Runtime::load()?;
    let mut samples = runtime.monitors.start(kind).await?;

    println!("  Monitoring {kind} every {} ms. Press Ctrl+C to stop.", runtime.config.monitor.interval_ms);
    println!();

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            sample = samples.recv() => match sample {
                Ok(sample) => println!("  {sample}"),
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "Monitor output lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    let history = runtime.monitors.history(kind).await;
    runtime.monitors.stop(kind).await?;
    println!();
    println!("  Stopped {kind} monitoring ({} sample(s) kept).", history.len());
    Ok(())
}
