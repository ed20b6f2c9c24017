use crate::clients::ComputeClient;
use crate::config::Config;
use crate::db::LocalStorage;

pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    println!("✓ Config is valid");

    let storage = LocalStorage::open(&config.general.storage_path).await?;
    storage.ping().await?;
    println!("✓ Local storage reachable at {}", config.general.storage_path);

    if config.oracle.api_key.is_empty() {
        println!("⚠ No generative AI key set; career verdicts will use the placeholder");
    }
    if config.admin.key.is_empty() {
        println!("⚠ No admin key set; /api/books/index will reject every request");
    }

    let compute = ComputeClient::with_shared_client(reqwest::Client::new(), &config.compute);
    match compute.ping().await {
        Ok(status) => println!(
            "✓ Computation backend answered {} at {}",
            status, config.compute.base_url
        ),
        Err(e) => {
            println!("✗ Computation backend unreachable: {e}");
            anyhow::bail!("backend check failed");
        }
    }

    Ok(())
}
