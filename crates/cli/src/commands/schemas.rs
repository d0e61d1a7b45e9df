use carelane_agent::tools::tool_catalog_json;

/// Prints the JSON Schemas of the four callable tools, exactly as they
/// are presented to the planning model.
pub fn run() -> String {
    let catalog = tool_catalog_json();
    serde_json::to_string_pretty(&catalog).unwrap_or_else(|_| catalog.to_string())
}
