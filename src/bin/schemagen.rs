use schemars::schema_for;
use sealedsecret_provider::sealing::SecretSpec;
use sealedsecret_provider::ProviderConfig;

fn main() -> Result<(), serde_json::Error> {
    let schemas = serde_json::json!({
        "providerConfig": schema_for!(ProviderConfig),
        "secretSpec": schema_for!(SecretSpec),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
