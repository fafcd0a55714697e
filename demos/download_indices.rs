use anyhow::Result;
use gardin_query::{Client, QuerySpec};

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure credentials via env vars or a `.gardinrc` file.
    let client = Client::from_env()?;

    // One month of indices data.
    let query = QuerySpec::indices("2024-12-01T17:32:28Z", "2024-12-30T00:23:46Z");

    let path = client.retrieve(&query)?;
    println!("results saved to {}", path.display());
    Ok(())
}
