use crate::config::Config;

pub fn cmd_config_init() -> anyhow::Result<()> {
    let path = Config::default_config_path();
    if Config::create_default_if_missing()? {
        println!("✓ Created {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}
