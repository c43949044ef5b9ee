//! `lakeclaw actions`: list the catalog or print tool declarations.

use lakeclaw_actions::UnconfiguredWorkspace;
use lakeclaw_agent::{ToolCatalog, ToolFormat};
use std::sync::Arc;

pub async fn run(format: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    // Listing needs no credentials.
    let registry = lakeclaw_actions::default_registry(Arc::new(UnconfiguredWorkspace))?;

    if let Some(format) = format {
        let format: ToolFormat = format.parse()?;
        let catalog = ToolCatalog::build(&registry);
        println!("{}", serde_json::to_string_pretty(&catalog.render(format))?);
        return Ok(());
    }

    println!("{} actions\n", registry.len());
    for descriptor in registry.list() {
        let params: Vec<String> = descriptor
            .params
            .iter()
            .map(|p| if p.required { format!("{}*", p.name) } else { p.name.clone() })
            .collect();
        println!("  {:<26} [{}] {}", descriptor.name, descriptor.side_effect, descriptor.description);
        if !params.is_empty() {
            println!("  {:<26} params: {}", "", params.join(", "));
        }
    }
    println!("\n  * required");

    Ok(())
}
