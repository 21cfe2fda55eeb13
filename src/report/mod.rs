//! Report Builder (C6): renders the JSON and Markdown reports side by side.
//! See spec §4.6. JSON key order is load-bearing (spec: "top-level keys,
//! stable order"), so the document is assembled directly as a
//! `serde_json::Value` with the `preserve_order` feature enabled rather than
//! derived from a struct.

use crate::artifacts::model::ArtifactSet;
use crate::correlate::CorrelationOutput;
use crate::driver::PluginInvocation;
use crate::error::{AnalysisError, Result};
use crate::technique::{build_technique_index, technique_name};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub ok: bool,
    pub error: Option<String>,
    pub row_count: usize,
    pub warnings: Vec<String>,
}

pub struct ReportInput<'a> {
    pub image_path: String,
    pub analysis_time: String,
    /// Catalogue order; skipped plugins are not included (spec §4.7 step 4).
    pub plugin_status: Vec<(String, PluginStatus)>,
    pub analysis_status: String,
    pub symbol_error: bool,
    /// The `windows.info.Info` outcome, embedded verbatim into
    /// `meta.profile_info` so the report can explain itself (spec §3).
    pub info_invocation: &'a PluginInvocation,
    pub artifacts: &'a ArtifactSet,
    pub correlation: &'a CorrelationOutput,
}

pub fn build_json(input: &ReportInput) -> Value {
    let mut root = Map::new();
    root.insert("meta".into(), build_meta(input));
    root.insert(
        "iocs".into(),
        serde_json::to_value(&input.correlation.indicators).unwrap_or(Value::Array(vec![])),
    );
    root.insert("sections".into(), build_sections(input.artifacts));
    root.insert(
        "special_analysis".into(),
        serde_json::to_value(&input.correlation.special_analysis).unwrap_or(Value::Null),
    );
    root.insert("technique_index".into(), build_technique_index_value(input));
    root.insert("summary".into(), build_summary(input));
    Value::Object(root)
}

fn build_meta(input: &ReportInput) -> Value {
    let mut meta = Map::new();
    meta.insert("image_path".into(), Value::from(input.image_path.clone()));
    meta.insert("analysis_time".into(), Value::from(input.analysis_time.clone()));
    meta.insert("analysis_status".into(), Value::from(input.analysis_status.clone()));
    meta.insert("symbol_error".into(), Value::from(input.symbol_error));

    let mut plugin_status = Map::new();
    for (name, status) in &input.plugin_status {
        plugin_status.insert(name.clone(), serde_json::to_value(status).unwrap_or(Value::Null));
    }
    meta.insert("plugin_status".into(), Value::Object(plugin_status));
    meta.insert("profile_info".into(), build_profile_info(input.info_invocation));
    Value::Object(meta)
}

/// Embeds the `windows.info.Info` outcome verbatim — rows, error, warnings —
/// so the report can explain itself without a separate lookup (spec §3).
fn build_profile_info(info_invocation: &PluginInvocation) -> Value {
    let mut profile_info = Map::new();
    profile_info.insert(
        "rows".into(),
        serde_json::to_value(&info_invocation.rows).unwrap_or(Value::Array(vec![])),
    );
    profile_info.insert(
        "error".into(),
        info_invocation.error.clone().map(Value::from).unwrap_or(Value::Null),
    );
    profile_info.insert(
        "warnings".into(),
        serde_json::to_value(&info_invocation.warnings).unwrap_or(Value::Array(vec![])),
    );
    Value::Object(profile_info)
}

fn build_sections(artifacts: &ArtifactSet) -> Value {
    let mut sections = Map::new();
    sections.insert(
        "suspicious_processes".into(),
        serde_json::to_value(
            artifacts.processes.iter().chain(artifacts.scanned_processes.iter())
                .filter(|p| !p.flags.is_empty())
                .collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_dlls".into(),
        serde_json::to_value(
            artifacts.modules.iter().filter(|m| !m.flags.is_empty()).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_drivers".into(),
        serde_json::to_value(
            artifacts.drivers.iter().filter(|d| !d.flags.is_empty()).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_hooks".into(),
        serde_json::to_value(
            artifacts.hooks.iter().filter(|h| h.is_suspicious).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_injections".into(),
        serde_json::to_value(
            artifacts.regions.iter().filter(|r| r.is_suspicious).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_network".into(),
        serde_json::to_value(
            artifacts.connections.iter().filter(|c| c.is_suspicious).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "suspicious_services".into(),
        serde_json::to_value(
            artifacts.services.iter().filter(|s| !s.flags.is_empty()).collect::<Vec<_>>(),
        )
        .unwrap_or(Value::Array(vec![])),
    );
    sections.insert(
        "loader_mismatches".into(),
        serde_json::to_value(&artifacts.loader_records).unwrap_or(Value::Array(vec![])),
    );
    Value::Object(sections)
}

fn build_technique_index_value(input: &ReportInput) -> Value {
    let mut index = Map::new();
    for (technique_id, kinds) in build_technique_index(&input.correlation.indicators) {
        index.insert(technique_id, Value::from(kinds));
    }
    Value::Object(index)
}

fn build_summary(input: &ReportInput) -> Value {
    let mut summary = Map::new();
    summary.insert("total_iocs".into(), Value::from(input.correlation.indicators.len()));
    summary.insert(
        "confidence_level".into(),
        Value::from(input.correlation.confidence.as_str()),
    );
    Value::Object(summary)
}

/// Renders the Markdown companion. Must reproduce every number/name present
/// in the JSON (spec §4.6); built directly from `json` rather than recomputed
/// so the two can never drift.
pub fn build_markdown(input: &ReportInput, json: &Value) -> String {
    let mut out = String::new();

    out.push_str("# Memory Analysis Report\n\n");
    out.push_str(&format!("- Image: `{}`\n", input.image_path));
    out.push_str(&format!("- Analysis time: {}\n", input.analysis_time));
    out.push_str(&format!("- Analysis status: {}\n", input.analysis_status));
    out.push_str(&format!("- Symbol error: {}\n\n", input.symbol_error));

    out.push_str("## Executive Summary\n\n");
    out.push_str(&format!("- Total IOCs: {}\n", input.correlation.indicators.len()));
    out.push_str(&format!("- Confidence level: {}\n\n", input.correlation.confidence.as_str()));

    out.push_str("## Plugin Status\n\n");
    out.push_str("| Plugin | OK | Rows | Error |\n|---|---|---|---|\n");
    for (name, status) in &input.plugin_status {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            name,
            status.ok,
            status.row_count,
            status.error.as_deref().unwrap_or(""),
        ));
    }
    out.push('\n');

    out.push_str("## Indicators\n\n");
    if input.correlation.indicators.is_empty() {
        out.push_str("No indicators were detected.\n\n");
    } else {
        for indicator in &input.correlation.indicators {
            let techniques = indicator
                .technique_ids
                .iter()
                .map(|id| format!("{} ({})", id, technique_name(id)))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "- **{}** — {}{}\n",
                indicator.kind.as_str(),
                indicator.description,
                if techniques.is_empty() { String::new() } else { format!(" [{}]", techniques) },
            ));
        }
        out.push('\n');
    }

    out.push_str("## Sections\n\n");
    if let Some(sections) = json.get("sections").and_then(|v| v.as_object()) {
        for (name, value) in sections {
            let count = value.as_array().map(|a| a.len()).unwrap_or(0);
            out.push_str(&format!("- {}: {}\n", name, count));
        }
    }
    out.push('\n');

    out.push_str("## Vendor Buckets\n\n");
    if let Some(special) = json.get("special_analysis").and_then(|v| v.as_object()) {
        for (name, value) in special {
            let count = value.as_array().map(|a| a.len()).unwrap_or(0);
            out.push_str(&format!("- {}: {} process(es)\n", name, count));
        }
    }
    out.push('\n');

    out.push_str("## Technique Index\n\n");
    if let Some(index) = json.get("technique_index").and_then(|v| v.as_object()) {
        if index.is_empty() {
            out.push_str("No techniques were triggered.\n");
        } else {
            for (technique_id, kinds) in index {
                let kinds_str = kinds
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "- **{}** ({}): {}\n",
                    technique_id,
                    technique_name(technique_id),
                    kinds_str
                ));
            }
        }
    }

    out
}

/// Writes `memory_report.json` and `memory_report.md` via write-to-temp then
/// rename, so a crash between the two can never leave one report stale
/// relative to the other (spec §5 cancellation contract, §4.6).
pub fn write_reports(output_dir: &Path, json: &Value, markdown: &str) -> Result<()> {
    let json_text = serde_json::to_string_pretty(json)?;
    write_atomic(&output_dir.join("memory_report.json"), json_text.as_bytes())?;
    write_atomic(&output_dir.join("memory_report.md"), markdown.as_bytes())?;
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    {
        let mut file = fs::File::create(&tmp_path).map_err(AnalysisError::OutputWriteFailure)?;
        file.write_all(contents).map_err(AnalysisError::OutputWriteFailure)?;
        file.sync_all().map_err(AnalysisError::OutputWriteFailure)?;
    }
    fs::rename(&tmp_path, path).map_err(AnalysisError::OutputWriteFailure)?;
    Ok(())
}

/// Dumps every plugin's raw stdout under `D/raw/<plugin_name>.txt`, purely
/// for operator auditing (spec §4.6, SPEC_FULL §4.8 makes this unconditional).
pub fn write_raw_outputs(output_dir: &Path, raw_outputs: &[(String, String)]) -> Result<()> {
    let raw_dir = output_dir.join("raw");
    fs::create_dir_all(&raw_dir).map_err(AnalysisError::OutputWriteFailure)?;
    for (plugin_name, stdout) in raw_outputs {
        let file_name = format!("{}.txt", plugin_name);
        fs::write(raw_dir.join(file_name), stdout).map_err(AnalysisError::OutputWriteFailure)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::Confidence;

    fn empty_input<'a>(
        artifacts: &'a ArtifactSet,
        correlation: &'a CorrelationOutput,
        info_invocation: &'a PluginInvocation,
    ) -> ReportInput<'a> {
        ReportInput {
            image_path: "mem.raw".to_string(),
            analysis_time: "2026-01-01T00:00:00Z".to_string(),
            plugin_status: vec![(
                "windows.pslist.PsList".to_string(),
                PluginStatus { ok: true, error: None, row_count: 1, warnings: Vec::new() },
            )],
            analysis_status: "ok".to_string(),
            symbol_error: false,
            info_invocation,
            artifacts,
            correlation,
        }
    }

    #[test]
    fn json_top_level_keys_are_in_stable_order() {
        let artifacts = ArtifactSet::default();
        let correlation = CorrelationOutput {
            indicators: Vec::new(),
            special_analysis: Default::default(),
            confidence: Confidence::None,
        };
        let info_invocation = PluginInvocation::default();
        let input = empty_input(&artifacts, &correlation, &info_invocation);
        let json = build_json(&input);
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["meta", "iocs", "sections", "special_analysis", "technique_index", "summary"]);
    }

    #[test]
    fn markdown_reproduces_total_iocs_from_json() {
        let artifacts = ArtifactSet::default();
        let correlation = CorrelationOutput {
            indicators: Vec::new(),
            special_analysis: Default::default(),
            confidence: Confidence::None,
        };
        let info_invocation = PluginInvocation::default();
        let input = empty_input(&artifacts, &correlation, &info_invocation);
        let json = build_json(&input);
        let markdown = build_markdown(&input, &json);
        assert!(markdown.contains("Total IOCs: 0"));
    }

    #[test]
    fn meta_embeds_profile_info_verbatim() {
        let artifacts = ArtifactSet::default();
        let correlation = CorrelationOutput {
            indicators: Vec::new(),
            special_analysis: Default::default(),
            confidence: Confidence::None,
        };
        let mut info_invocation = PluginInvocation::default();
        info_invocation.warnings.push("kernel symbols missing".to_string());
        let input = empty_input(&artifacts, &correlation, &info_invocation);
        let json = build_json(&input);
        let profile_info = json.get("meta").unwrap().get("profile_info").unwrap();
        assert_eq!(
            profile_info.get("warnings").unwrap().as_array().unwrap(),
            &vec![Value::from("kernel symbols missing")]
        );
    }
}
