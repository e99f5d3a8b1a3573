use anyhow::bail;
use serde::{Deserialize, Serialize};

use feature_tracker::OpticalFlowOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "optical_flow", default)]
    pub optical_flow: OpticalFlowOptions,
}


impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        // Strip YAML directive if present (e.g., %YAML:1.0)
        let content = if content.trim_start().starts_with("%YAML") {
            content
                .lines()
                .skip_while(|line| line.trim_start().starts_with("%"))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            content.to_string()
        };
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let options = &self.optical_flow;
        if options.max_iteration == 0 {
            bail!("optical_flow.max_iteration must be at least 1");
        }
        if !(options.max_converge_step > 0.0) {
            bail!("optical_flow.max_converge_step must be positive, got {}", options.max_converge_step);
        }
        if options.max_tolerance_large_step == 0 {
            bail!("optical_flow.max_tolerance_large_step must be at least 1");
        }
        Ok(())
    }
}
