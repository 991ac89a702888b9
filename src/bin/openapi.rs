use anyhow::Result;

// Print the OpenAPI document built from the same router the server mounts.
fn main() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&rocco::api::openapi())?);
    Ok(())
}
