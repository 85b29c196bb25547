//! `slothtop tools`: list the built-in tools and their parameters.

use super::Runtime;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let registry = runtime.tools()?;

    println!("Built-in Tools ({})", registry.len());
    println!("==================");
    for tool in registry.list() {
        println!();
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        for p in &tool.params {
            let required = if p.required { "required" } else { "optional" };
            println!("    - {} ({}, {required}): {}", p.name, p.kind.as_str(), p.description);
        }
    }
    if runtime.config.tools.vault_path.is_none() {
        println!();
        println!("  Set [tools] vault_path in config.toml to enable vault_search.");
    }
    Ok(())
}
