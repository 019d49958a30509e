use anyhow::{Context, Result};
use huddle_infrastructure::ConfigService;

pub fn show(service: &ConfigService) -> Result<()> {
    let config = service
        .get_config()
        .with_context(|| format!("Failed to load {}", service.path().display()))?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}

pub fn path(service: &ConfigService) {
    let path = service.path();
    let marker = if path.exists() { "" } else { " (not created yet)" };
    println!("{}{}", path.display(), marker);
}
