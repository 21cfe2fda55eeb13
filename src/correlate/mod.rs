//! Correlation Engine (C4): the semantic heart of the pipeline. Turns lifted
//! artifacts into a deterministic, ordered list of Indicators, flagging the
//! entities that triggered them along the way. See spec §4.4.
//!
//! Rules 2 ("process path legitimacy") and 4 ("command-line obfuscation")
//! both describe conditions that feed a single `suspicious_process`
//! indicator per process; rule 4 never says it emits its own indicator, only
//! that it adds a flag and enriches the indicator's data. They are
//! implemented here as one combined pass so each process gets at most one
//! `suspicious_process` indicator covering both path and command-line
//! findings; rule 3 (`keyboard_manipulation`) remains its own pass and its
//! own indicator, exactly as spec'd.

use crate::artifacts::model::ArtifactSet;
use crate::technique::order_technique_ids;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

const LEGITIMATE_PATH_PREFIXES: [&str; 4] =
    ["c:\\windows\\", "c:\\program files\\", "c:\\program files (x86)\\", "c:\\programdata\\"];

const INPUT_HANDLER_PROCESSES: [&str; 3] = ["textinputhost.exe", "ctfmon.exe", "osk.exe"];

const SUSPICIOUS_PORTS: [u16; 6] = [1337, 4444, 5555, 8082, 8443, 31337];

const KEYLOGGING_APIS: [&str; 6] = [
    "GetAsyncKeyState",
    "SetWindowsHookEx",
    "NtUserGetRawInputData",
    "NtReadFile",
    "NtUserSendInput",
    "ReadFile",
];

const CREDENTIAL_APIS: [&str; 4] =
    ["CredRead", "CredWrite", "CredEnumerate", "LsaRetrievePrivateData"];

const CMDLINE_MARKERS: [&str; 4] = ["-enc", "base64", "bypass", "-nop"];

const UNUSUAL_PATH_SUBSTRINGS: [&str; 3] = ["\\temp\\", "\\appdata\\", "\\users\\"];

const RAZER_TERMS: [&str; 3] = ["razer", "synapse", "chroma"];
const ASUS_TERMS: [&str; 3] = ["asus", "armoury", "rog"];
const ONEDRIVE_TERMS: [&str; 2] = ["onedrive.exe", "onedrivesetup.exe"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    SuspiciousProcess,
    KeyboardManipulation,
    DllMismatch,
    DriverAnomaly,
    ApiHooking,
    MemoryInjection,
    SuspiciousNetwork,
    ServiceAnomaly,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::SuspiciousProcess => "suspicious_process",
            IndicatorKind::KeyboardManipulation => "keyboard_manipulation",
            IndicatorKind::DllMismatch => "dll_mismatch",
            IndicatorKind::DriverAnomaly => "driver_anomaly",
            IndicatorKind::ApiHooking => "api_hooking",
            IndicatorKind::MemoryInjection => "memory_injection",
            IndicatorKind::SuspiciousNetwork => "suspicious_network",
            IndicatorKind::ServiceAnomaly => "service_anomaly",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub description: String,
    pub data: Map<String, Value>,
    pub technique_ids: Vec<String>,
}

fn indicator(
    kind: IndicatorKind,
    description: impl Into<String>,
    data: Map<String, Value>,
    technique_ids: &[&str],
) -> Indicator {
    Indicator {
        kind,
        description: description.into(),
        data,
        technique_ids: order_technique_ids(technique_ids),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    None,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VendorBucketEntry {
    pub pid: i64,
    pub name: String,
    pub path: Option<String>,
    pub module_count: usize,
    pub hook_count: usize,
    pub suspicious_hook_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpecialAnalysis {
    pub textinputhost: Vec<VendorBucketEntry>,
    pub ctfmon: Vec<VendorBucketEntry>,
    pub razer: Vec<VendorBucketEntry>,
    pub asus: Vec<VendorBucketEntry>,
    pub onedrive: Vec<VendorBucketEntry>,
}

pub struct CorrelationOutput {
    pub indicators: Vec<Indicator>,
    pub special_analysis: SpecialAnalysis,
    pub confidence: Confidence,
}

/// Runs rules 1-11 against `artifacts`, mutating per-entity flags/
/// `is_suspicious` in place, and returns the ordered indicator list plus the
/// derived confidence label (spec §4.4).
pub fn run(artifacts: &mut ArtifactSet) -> CorrelationOutput {
    let mut indicators = Vec::new();

    rule_hidden_process(artifacts, &mut indicators);
    rule_process_path_and_cmdline(artifacts, &mut indicators);
    rule_input_handler(artifacts, &mut indicators);
    rule_module_path(artifacts, &mut indicators);
    rule_driver_anomalies(artifacts, &mut indicators);
    rule_api_hooking(artifacts, &mut indicators);
    rule_memory_injection(artifacts, &mut indicators);
    rule_network_anomaly(artifacts, &mut indicators);
    rule_service_anomaly(artifacts, &mut indicators);
    let special_analysis = rule_vendor_buckets(artifacts);

    let confidence = calculate_confidence(&indicators);

    CorrelationOutput { indicators, special_analysis, confidence }
}

fn is_legitimate_path(path_lower: &str) -> bool {
    LEGITIMATE_PATH_PREFIXES.iter().any(|p| path_lower.starts_with(p))
}

/// Rule 1.
fn rule_hidden_process(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    let listed: HashSet<i64> = artifacts.processes.iter().map(|p| p.pid).collect();
    for proc in artifacts.scanned_processes.iter_mut() {
        if !listed.contains(&proc.pid) {
            proc.flags.push("hidden_process".to_string());
            let mut data = Map::new();
            data.insert("pid".into(), Value::from(proc.pid));
            data.insert("name".into(), Value::from(proc.name.clone()));
            data.insert("path".into(), json_opt_string(&proc.path));
            data.insert("flags".into(), Value::from(proc.flags.clone()));
            indicators.push(indicator(
                IndicatorKind::SuspiciousProcess,
                "process visible in the scanner but not the process listing",
                data,
                &["T1014"],
            ));
        }
    }
}

/// Rules 2 and 4 (see module doc comment for why they're combined).
fn rule_process_path_and_cmdline(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    let cmdline_by_pid: HashMap<i64, &str> =
        artifacts.cmdlines.iter().map(|c| (c.pid, c.cmdline.as_str())).collect();

    for proc in artifacts.processes.iter_mut() {
        let mut reasons = Vec::new();
        let path_lower = proc.path.as_deref().unwrap_or("").to_lowercase();

        if path_lower.is_empty() {
            proc.flags.push("no_path".to_string());
            reasons.push("no executable path".to_string());
        } else if !is_legitimate_path(&path_lower) {
            proc.flags.push("unusual_path".to_string());
            reasons.push(format!("path outside standard directories: {}", proc.path.as_deref().unwrap_or("")));
        }

        let mut cmdline_snippet = None;
        if let Some(cmdline) = cmdline_by_pid.get(&proc.pid) {
            let lower = cmdline.to_lowercase();
            if CMDLINE_MARKERS.iter().any(|m| lower.contains(m)) {
                proc.flags.push("suspicious_cmdline".to_string());
                let snippet: String = cmdline.chars().take(100).collect();
                reasons.push(format!("suspicious command line: {}", snippet));
                cmdline_snippet = Some(snippet);
            }
        }

        if !proc.flags.is_empty() {
            let mut data = Map::new();
            data.insert("pid".into(), Value::from(proc.pid));
            data.insert("name".into(), Value::from(proc.name.clone()));
            data.insert("path".into(), json_opt_string(&proc.path));
            data.insert("flags".into(), Value::from(proc.flags.clone()));
            if let Some(snippet) = cmdline_snippet {
                data.insert("cmdline_snippet".into(), Value::from(snippet));
            }
            let description = if reasons.is_empty() {
                "process flagged as suspicious".to_string()
            } else {
                reasons.join("; ")
            };
            indicators.push(indicator(IndicatorKind::SuspiciousProcess, description, data, &[]));
        }
    }
}

/// Rule 3.
fn rule_input_handler(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for proc in artifacts.processes.iter_mut() {
        if INPUT_HANDLER_PROCESSES.contains(&proc.name.to_lowercase().as_str()) {
            proc.flags.push("input_process".to_string());
            let mut data = Map::new();
            data.insert("pid".into(), Value::from(proc.pid));
            data.insert("name".into(), Value::from(proc.name.clone()));
            indicators.push(indicator(
                IndicatorKind::KeyboardManipulation,
                format!("{} handles keyboard input", proc.name),
                data,
                &["T1056.001", "T1056.004"],
            ));
        }
    }
}

/// Rule 5.
fn rule_module_path(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for module in artifacts.modules.iter_mut() {
        if module.full_path.is_empty() || module.full_path.starts_with('\\') {
            module.flags.push("memory_only".to_string());
        }
        let path_lower = module.full_path.to_lowercase();
        if UNUSUAL_PATH_SUBSTRINGS.iter().any(|s| path_lower.contains(s)) {
            module.flags.push("unusual_path".to_string());
        }

        if !module.flags.is_empty() {
            let mut data = Map::new();
            data.insert("pid".into(), Value::from(module.process_pid));
            data.insert("dll".into(), Value::from(module.base_name.clone()));
            data.insert("path".into(), Value::from(module.full_path.clone()));
            data.insert("flags".into(), Value::from(module.flags.clone()));
            indicators.push(indicator(
                IndicatorKind::DllMismatch,
                format!("{} is not a standard on-disk module", module.base_name),
                data,
                &["T1055"],
            ));
        }
    }
}

/// Rule 6.
fn rule_driver_anomalies(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for driver in artifacts.drivers.iter_mut() {
        let path_lower = driver.path.to_lowercase();
        let name_lower = driver.name.to_lowercase();

        if path_lower.contains("\\temp\\") || path_lower.contains("\\users\\") {
            driver.flags.push("unusual_path".to_string());
        }
        if name_lower.contains("scvhost") || name_lower.contains("lsas") {
            driver.flags.push("typosquatting".to_string());
        }

        if !driver.flags.is_empty() {
            let mut data = Map::new();
            data.insert("name".into(), Value::from(driver.name.clone()));
            data.insert("path".into(), Value::from(driver.path.clone()));
            data.insert("flags".into(), Value::from(driver.flags.clone()));
            indicators.push(indicator(
                IndicatorKind::DriverAnomaly,
                format!("{} has anomalous characteristics", driver.name),
                data,
                &["T1014"],
            ));
        }
    }
}

/// Rule 7.
fn rule_api_hooking(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for hook in artifacts.hooks.iter_mut() {
        let func_lower = hook.function_name.to_lowercase();
        let is_keylog = KEYLOGGING_APIS.iter().any(|api| func_lower.contains(&api.to_lowercase()));
        let is_cred = CREDENTIAL_APIS.iter().any(|api| func_lower.contains(&api.to_lowercase()));

        if is_keylog || is_cred {
            hook.is_suspicious = true;
            let mut techniques = Vec::new();
            if is_keylog {
                techniques.push("T1056.001");
            }
            if is_cred {
                techniques.push("T1056.004");
            }

            let mut data = Map::new();
            data.insert("function".into(), Value::from(hook.function_name.clone()));
            data.insert("module".into(), json_opt_string(&hook.module));
            data.insert("target".into(), json_opt_string(&hook.target));
            data.insert("pid".into(), hook.process_pid.map(Value::from).unwrap_or(Value::Null));
            indicators.push(indicator(
                IndicatorKind::ApiHooking,
                format!("suspicious hook on {}", hook.function_name),
                data,
                &techniques,
            ));
        }
    }
}

/// Rule 8.
fn rule_memory_injection(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for region in artifacts.regions.iter_mut() {
        let protection = &region.protection;
        if protection.contains("RWX")
            || (protection.contains("READWRITE") && protection.contains("EXECUTE"))
        {
            region.is_suspicious = true;
            let mut data = Map::new();
            data.insert("process".into(), Value::from(region.process_name.clone()));
            data.insert("pid".into(), region.pid.map(Value::from).unwrap_or(Value::Null));
            data.insert("protection".into(), Value::from(protection.clone()));
            data.insert("tag".into(), Value::from(region.tag.clone()));
            indicators.push(indicator(
                IndicatorKind::MemoryInjection,
                format!("suspicious executable region: {}", protection),
                data,
                &["T1055"],
            ));
        }
    }
}

/// Rule 9.
fn rule_network_anomaly(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for conn in artifacts.connections.iter_mut() {
        let suspicious_port =
            SUSPICIOUS_PORTS.contains(&conn.local_port) || SUSPICIOUS_PORTS.contains(&conn.remote_port);
        let private_outbound = conn.remote_addr.starts_with("10.");

        if suspicious_port || private_outbound {
            conn.is_suspicious = true;
            let mut data = Map::new();
            data.insert("proto".into(), Value::from(conn.proto.clone()));
            data.insert("local".into(), Value::from(format!("{}:{}", conn.local_addr, conn.local_port)));
            data.insert("remote".into(), Value::from(format!("{}:{}", conn.remote_addr, conn.remote_port)));
            data.insert("pid".into(), conn.process_pid.map(Value::from).unwrap_or(Value::Null));
            let mut reasons = Vec::new();
            if suspicious_port {
                reasons.push(format!("suspicious port: {}:{}", conn.local_port, conn.remote_port));
            }
            if private_outbound {
                reasons.push("outbound connection to a private network".to_string());
            }
            indicators.push(indicator(
                IndicatorKind::SuspiciousNetwork,
                reasons.join("; "),
                data,
                &[],
            ));
        }
    }
}

/// Rule 10.
fn rule_service_anomaly(artifacts: &mut ArtifactSet, indicators: &mut Vec<Indicator>) {
    for service in artifacts.services.iter_mut() {
        let path_lower = service.path.as_deref().unwrap_or("").to_lowercase();
        if service.path.is_some() && !is_legitimate_path(&path_lower) {
            service.flags.push("unusual_path".to_string());
            let mut data = Map::new();
            data.insert("name".into(), Value::from(service.name.clone()));
            data.insert("path".into(), json_opt_string(&service.path));
            data.insert("pid".into(), service.pid.map(Value::from).unwrap_or(Value::Null));
            data.insert("flags".into(), Value::from(service.flags.clone()));
            indicators.push(indicator(
                IndicatorKind::ServiceAnomaly,
                format!("service binary in non-standard path: {}", service.path.as_deref().unwrap_or("")),
                data,
                &["T1543"],
            ));
        }
    }
}

/// Rule 11. Not indicators — grouping only.
fn rule_vendor_buckets(artifacts: &ArtifactSet) -> SpecialAnalysis {
    let mut analysis = SpecialAnalysis::default();

    for proc in &artifacts.processes {
        let name_lower = proc.name.to_lowercase();
        let module_count = artifacts.modules.iter().filter(|m| m.process_pid == proc.pid).count();
        let proc_hooks: Vec<_> =
            artifacts.hooks.iter().filter(|h| h.process_pid == Some(proc.pid)).collect();
        let hook_count = proc_hooks.len();
        let suspicious_hook_count = proc_hooks.iter().filter(|h| h.is_suspicious).count();

        let entry = || VendorBucketEntry {
            pid: proc.pid,
            name: proc.name.clone(),
            path: proc.path.clone(),
            module_count,
            hook_count,
            suspicious_hook_count,
        };

        if name_lower == "textinputhost.exe" {
            analysis.textinputhost.push(entry());
        }
        if name_lower == "ctfmon.exe" {
            analysis.ctfmon.push(entry());
        }
        if RAZER_TERMS.iter().any(|t| name_lower.contains(t)) {
            analysis.razer.push(entry());
        }
        if ASUS_TERMS.iter().any(|t| name_lower.contains(t)) {
            analysis.asus.push(entry());
        }
        if ONEDRIVE_TERMS.iter().any(|t| name_lower.contains(t)) {
            analysis.onedrive.push(entry());
        }
    }

    analysis
}

fn calculate_confidence(indicators: &[Indicator]) -> Confidence {
    if indicators.is_empty() {
        return Confidence::None;
    }

    let high_count = indicators
        .iter()
        .filter(|i| match i.kind {
            IndicatorKind::ApiHooking | IndicatorKind::MemoryInjection => true,
            IndicatorKind::SuspiciousProcess => i
                .data
                .get("flags")
                .and_then(|v| v.as_array())
                .map(|flags| flags.iter().any(|f| f.as_str() == Some("hidden_process")))
                .unwrap_or(false),
            _ => false,
        })
        .count();

    if high_count >= 3 {
        Confidence::High
    } else if high_count >= 1 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn json_opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::from(s.clone()),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::model::{CommandLine, Hook, MemoryRegion, NetworkEndpoint, Process};

    fn proc(pid: i64, name: &str, path: &str) -> Process {
        Process { pid, ppid: None, name: name.to_string(), path: Some(path.to_string()), create_time: None, exit_time: None, flags: Vec::new() }
    }

    #[test]
    fn hidden_process_emits_high_weight_indicator() {
        let mut artifacts = ArtifactSet::default();
        artifacts.processes = vec![proc(4, "System", "c:\\windows\\system32\\ntoskrnl.exe")];
        artifacts.scanned_processes = vec![
            proc(4, "System", "c:\\windows\\system32\\ntoskrnl.exe"),
            proc(666, "evil.exe", "c:\\windows\\system32\\evil.exe"),
        ];

        let output = run(&mut artifacts);
        let hidden: Vec<_> = output
            .indicators
            .iter()
            .filter(|i| i.data.get("pid") == Some(&Value::from(666)))
            .collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].technique_ids, vec!["T1014"]);
        assert_eq!(output.confidence.as_str(), "medium");
    }

    #[test]
    fn legitimate_path_process_is_not_flagged() {
        let mut artifacts = ArtifactSet::default();
        artifacts.processes = vec![proc(4, "System", "c:\\windows\\system32\\ntoskrnl.exe")];

        let output = run(&mut artifacts);
        assert!(output.indicators.is_empty());
        assert_eq!(output.confidence.as_str(), "none");
    }

    #[test]
    fn cmdline_obfuscation_is_folded_into_suspicious_process() {
        let mut artifacts = ArtifactSet::default();
        artifacts.processes = vec![proc(10, "powershell.exe", "c:\\windows\\system32\\powershell.exe")];
        artifacts.cmdlines = vec![CommandLine { pid: 10, cmdline: "powershell -enc aGVsbG8=".to_string() }];

        let output = run(&mut artifacts);
        assert_eq!(output.indicators.len(), 1);
        assert_eq!(output.indicators[0].kind, IndicatorKind::SuspiciousProcess);
        assert!(output.indicators[0].data.contains_key("cmdline_snippet"));
    }

    #[test]
    fn hook_matching_both_api_lists_gets_both_techniques_ordered() {
        let mut artifacts = ArtifactSet::default();
        artifacts.hooks = vec![Hook {
            process_pid: Some(10),
            function_name: "CredReadAndSetWindowsHookEx".to_string(),
            module: None,
            target: None,
            is_suspicious: false,
        }];

        let output = run(&mut artifacts);
        assert_eq!(output.indicators[0].technique_ids, vec!["T1056.001", "T1056.004"]);
    }

    #[test]
    fn rwx_region_triggers_memory_injection() {
        let mut artifacts = ArtifactSet::default();
        artifacts.regions = vec![MemoryRegion {
            pid: Some(20),
            process_name: "svchost.exe".to_string(),
            protection: "PAGE_EXECUTE_READWRITE".to_string(),
            tag: "VAD".to_string(),
            is_suspicious: false,
        }];

        let output = run(&mut artifacts);
        assert_eq!(output.indicators.len(), 1);
        assert_eq!(output.indicators[0].kind, IndicatorKind::MemoryInjection);
    }

    #[test]
    fn suspicious_port_flags_network_endpoint() {
        let mut artifacts = ArtifactSet::default();
        artifacts.connections = vec![NetworkEndpoint {
            proto: "TCP".to_string(),
            local_addr: "0.0.0.0".to_string(),
            local_port: 4444,
            remote_addr: "1.2.3.4".to_string(),
            remote_port: 52000,
            process_pid: Some(5000),
            is_suspicious: false,
        }];

        let output = run(&mut artifacts);
        assert_eq!(output.indicators.len(), 1);
        assert_eq!(output.indicators[0].kind, IndicatorKind::SuspiciousNetwork);
        assert_eq!(output.indicators[0].data.get("pid"), Some(&Value::from(5000)));
    }
}
