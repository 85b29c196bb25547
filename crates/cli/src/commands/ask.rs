//! `slothtop ask`: single-message mode.

use super::Runtime;

pub async fn run(message: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let mut session = runtime.open_session(runtime.provider()?).await?;

    eprint!("  Thinking...");
    let result = session.send(message).await;
    eprint!("\r              \r");
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.output);
    }

    runtime.monitors.stop_all().await;
    Ok(())
}
