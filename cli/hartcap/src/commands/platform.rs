//! `hartcap platform`: platform override files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use hartcap_cm::platform::{generate_template, load_platform_toml, validate_platform};

/// Print or write a template `.platform.toml`.
pub fn template(name: &str, output: Option<&Path>) -> Result<()> {
    let toml = generate_template(name)?;
    match output {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            fs::write(path, &toml).with_context(|| format!("writing {}", path.display()))?;
            println!("Created {}", path.display());
        }
        None => print!("{toml}"),
    }
    Ok(())
}

pub fn validate(file: &Path) -> Result<()> {
    let platform =
        load_platform_toml(file).with_context(|| format!("loading {}", file.display()))?;
    match validate_platform(&platform) {
        Ok(()) => {
            println!("Platform '{}' is valid.", platform.name);
            Ok(())
        }
        Err(issues) => {
            for issue in &issues {
                eprintln!("{}: {}", issue.severity, issue.message);
            }
            bail!("platform '{}' has validation errors", platform.name)
        }
    }
}
