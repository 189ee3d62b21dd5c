//! Purpose: Build the `version` command's report.
//! Exports: `VersionReport`, `PluginVersion`.
//! Role: Pure formatting over the registry; the CLI decides text vs JSON.
//! Invariants: Plugins appear once each, in registry order.

use serde::Serialize;
use serde_json::Value;

use crate::core::context::Context;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginVersion {
    pub name: String,
    pub group: String,
    pub version: Option<String>,
    pub source: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub plugins: Vec<PluginVersion>,
}

impl VersionReport {
    pub fn collect(ctx: &Context) -> Self {
        let plugins = ctx
            .registry
            .iter()
            .map(|entry| PluginVersion {
                name: entry.name.clone(),
                group: entry.group().to_string(),
                version: entry.version().map(str::to_string),
                source: entry.source.as_str(),
            })
            .collect();
        Self {
            name: ctx.config.package.name.clone(),
            version: ctx.config.package.version.clone(),
            platform: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
            plugins,
        }
    }

    pub fn render_text(&self) -> String {
        let mut lines = vec![
            format!("{}/{} {}", self.name, self.version, self.platform),
            "=== Installed Plugins".to_string(),
        ];
        for plugin in &self.plugins {
            match &plugin.version {
                Some(version) => lines.push(format!("{} @{version}", plugin.group)),
                None => lines.push(plugin.group.clone()),
            }
        }
        lines.join("\n")
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
