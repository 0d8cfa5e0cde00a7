//! Platform configuration files.
//!
//! A `.platform.toml` file supplies the facts a device tree does not carry
//! (OEM identity of the emitted table) and may override the ones it does
//! (ISA string, timer, cache-block sizes).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CmError, Result};
use crate::records::{
    block_size_log2, CacheBlockRecord, IsaStringRecord, PlatformRecords, TimerRecord,
};

/// Identity stamped into the header of every generated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableIdentity {
    /// Up to 6 ASCII characters.
    pub oem_id: String,
    /// Up to 8 ASCII characters.
    pub oem_table_id: String,
    pub oem_revision: u32,
    /// Up to 4 ASCII characters.
    pub creator_id: String,
    pub creator_revision: u32,
    /// Table revision requested from the generator.
    pub revision: u8,
}

impl Default for TableIdentity {
    fn default() -> Self {
        Self {
            oem_id: "HARTCP".into(),
            oem_table_id: "HARTCAP".into(),
            oem_revision: 1,
            creator_id: "HCAP".into(),
            creator_revision: 1,
            revision: 1,
        }
    }
}

impl TableIdentity {
    pub fn oem_id_bytes(&self) -> [u8; 6] {
        space_padded(&self.oem_id)
    }

    pub fn oem_table_id_bytes(&self) -> [u8; 8] {
        space_padded(&self.oem_table_id)
    }

    pub fn creator_id_bytes(&self) -> [u8; 4] {
        space_padded(&self.creator_id)
    }
}

/// Copy `value` into a fixed-width field, padding with spaces. Longer values
/// are truncated; validation reports them first.
fn space_padded<const N: usize>(value: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (dst, src) in out.iter_mut().zip(value.bytes()) {
        *dst = src;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimerConfig {
    /// Frequency of the `time` CSR in Hz.
    pub timebase_frequency: u64,
    #[serde(default)]
    pub cannot_wake_cpu: bool,
}

/// Cache-block operation sizes in bytes. 0 means the operation is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CmoConfig {
    #[serde(default)]
    pub cbom_block_size: u64,
    #[serde(default)]
    pub cbop_block_size: u64,
    #[serde(default)]
    pub cboz_block_size: u64,
}

/// A platform definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// Platform name (e.g., "qemu-virt").
    pub name: String,
    /// ISA string reported for every hart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isa_string: Option<String>,
    #[serde(default)]
    pub table: TableIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmo: Vec<CmoConfig>,
}

impl PlatformConfig {
    /// A configuration that overrides nothing.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isa_string: None,
            table: TableIdentity::default(),
            timer: None,
            cmo: Vec::new(),
        }
    }

    /// Convert the overrides into records.
    pub fn records(&self) -> Result<PlatformRecords> {
        let timer = self.timer.as_ref().map(|t| TimerRecord {
            timebase_frequency: t.timebase_frequency,
            timer_cannot_wake_cpu: t.cannot_wake_cpu,
        });
        let isa_string = self
            .isa_string
            .as_ref()
            .map(|isa| IsaStringRecord { isa: isa.clone() });
        let cmo = self
            .cmo
            .iter()
            .map(|c| {
                CacheBlockRecord::from_bytes(c.cbom_block_size, c.cbop_block_size, c.cboz_block_size)
                    .ok_or_else(|| CmError::Validation {
                        detail: format!(
                            "cache block sizes {}/{}/{} are not powers of two",
                            c.cbom_block_size, c.cbop_block_size, c.cboz_block_size
                        ),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PlatformRecords {
            timer,
            isa_string,
            cmo,
        })
    }
}

/// A validation issue found in a platform definition.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    pub message: String,
}

/// Load a platform from a `.platform.toml` file.
pub fn load_platform_toml(path: &Path) -> Result<PlatformConfig> {
    if !path.exists() {
        return Err(CmError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_platform_toml(&content)
}

pub fn parse_platform_toml(toml_str: &str) -> Result<PlatformConfig> {
    let platform: PlatformConfig = toml::from_str(toml_str)?;
    Ok(platform)
}

pub fn platform_to_toml(platform: &PlatformConfig) -> Result<String> {
    let toml_str = toml::to_string_pretty(platform)?;
    Ok(toml_str)
}

/// Validate a platform definition.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with a list of problems.
pub fn validate_platform(platform: &PlatformConfig) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut error = |message: String| {
        issues.push(ValidationIssue {
            severity: "error",
            message,
        })
    };

    let table = &platform.table;
    for (field, value, width) in [
        ("oem-id", &table.oem_id, 6),
        ("oem-table-id", &table.oem_table_id, 8),
        ("creator-id", &table.creator_id, 4),
    ] {
        if !value.is_ascii() {
            error(format!("table {field} '{value}' is not ASCII"));
        } else if value.len() > width {
            error(format!(
                "table {field} '{value}' is longer than {width} characters"
            ));
        }
    }
    if table.revision == 0 {
        error("table revision must be at least 1".into());
    }

    if let Some(isa) = &platform.isa_string {
        if isa.is_empty() {
            error("isa-string is empty".into());
        } else if !isa.is_ascii() || isa.contains('\0') {
            error(format!("isa-string '{isa}' must be printable ASCII"));
        }
    }

    if let Some(timer) = &platform.timer {
        if timer.timebase_frequency == 0 {
            error("timer timebase-frequency is 0".into());
        }
    }

    for (i, cmo) in platform.cmo.iter().enumerate() {
        for (field, size) in [
            ("cbom-block-size", cmo.cbom_block_size),
            ("cbop-block-size", cmo.cbop_block_size),
            ("cboz-block-size", cmo.cboz_block_size),
        ] {
            if block_size_log2(size).is_none() {
                error(format!("cmo[{i}] {field} {size} is not a power of two"));
            }
        }
    }

    if platform.timer.is_none() {
        issues.push(ValidationIssue {
            severity: "warning",
            message: "no [timer] section; the device tree must provide timebase-frequency"
                .into(),
        });
    }

    let has_errors = issues.iter().any(|i| i.severity == "error");
    if has_errors {
        Err(issues)
    } else {
        Ok(())
    }
}

/// Generate a template `.platform.toml` seeded with QEMU `virt` values.
pub fn generate_template(name: &str) -> Result<String> {
    let platform = PlatformConfig {
        name: name.into(),
        isa_string: Some("rv64imafdch_zicbom_zicboz".into()),
        table: TableIdentity::default(),
        timer: Some(TimerConfig {
            timebase_frequency: 10_000_000,
            cannot_wake_cpu: false,
        }),
        cmo: vec![CmoConfig {
            cbom_block_size: 64,
            cbop_block_size: 64,
            cboz_block_size: 64,
        }],
    };
    platform_to_toml(&platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_toml() {
        let platform = parse_platform_toml(r#"name = "bare""#).unwrap();
        assert_eq!(platform, PlatformConfig::named("bare"));
        assert_eq!(&platform.table.oem_id_bytes(), b"HARTCP");
        assert_eq!(&platform.table.oem_table_id_bytes(), b"HARTCAP ");
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
name = "qemu-virt"
isa-string = "rv64imafdc_zicbom"

[table]
oem-id = "QEMU"
oem-table-id = "VIRT"
oem-revision = 7
creator-id = "QEMU"
creator-revision = 2
revision = 1

[timer]
timebase-frequency = 10000000
cannot-wake-cpu = true

[[cmo]]
cbom-block-size = 64
cboz-block-size = 64
"#;
        let platform = parse_platform_toml(toml_str).unwrap();
        assert_eq!(&platform.table.oem_id_bytes(), b"QEMU  ");
        assert_eq!(platform.table.oem_revision, 7);
        assert!(validate_platform(&platform).is_ok());

        let records = platform.records().unwrap();
        let timer = records.timer.unwrap();
        assert!(timer.timer_cannot_wake_cpu);
        assert_eq!(records.cmo[0].cbom_block_size, 6);
        assert_eq!(records.cmo[0].cbop_block_size, 0);
        assert_eq!(records.isa_string.unwrap().isa, "rv64imafdc_zicbom");
    }

    #[test]
    fn parse_invalid_returns_error() {
        assert!(parse_platform_toml("this is not valid toml [[[").is_err());
        assert!(parse_platform_toml("isa-string = \"rv64gc\"").is_err());
    }

    #[test]
    fn validate_long_oem_id() {
        let mut platform = PlatformConfig::named("x");
        platform.table.oem_id = "TOOLONGID".into();
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("oem-id")));
    }

    #[test]
    fn validate_bad_block_size() {
        let mut platform = PlatformConfig::named("x");
        platform.cmo.push(CmoConfig {
            cbom_block_size: 48,
            cbop_block_size: 64,
            cboz_block_size: 64,
        });
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("cbom-block-size 48")));
        assert!(platform.records().is_err());
    }

    #[test]
    fn missing_timer_is_only_a_warning() {
        let platform = PlatformConfig::named("x");
        assert!(validate_platform(&platform).is_ok());
    }

    #[test]
    fn generate_template_is_valid() {
        let toml_str = generate_template("my-board").unwrap();
        let platform = parse_platform_toml(&toml_str).unwrap();
        assert_eq!(platform.name, "my-board");
        assert!(validate_platform(&platform).is_ok());
        assert_eq!(platform.timer.unwrap().timebase_frequency, 10_000_000);
    }

    #[test]
    fn load_not_found() {
        let result = load_platform_toml(Path::new("/nonexistent/board.platform.toml"));
        assert!(matches!(result.unwrap_err(), CmError::FileNotFound { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.platform.toml");
        std::fs::write(&path, generate_template("file-test").unwrap()).unwrap();
        let platform = load_platform_toml(&path).unwrap();
        assert_eq!(platform.name, "file-test");
    }
}
