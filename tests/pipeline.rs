//! End-to-end pipeline test driven by a fake `CommandRunner`, exercising the
//! "hidden process" scenario without depending on a real external tool.

use memforensics::driver::CommandRunner;
use memforensics::orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

struct FakeRunner;

impl CommandRunner for FakeRunner {
    fn run(&self, _binary: &str, args: &[String], _timeout: Duration) -> Option<(String, String, bool)> {
        let plugin_name = args.get(2).map(String::as_str).unwrap_or("");
        let stdout = match plugin_name {
            "windows.pslist.PsList" => {
                r#"{"rows":[{"PID":"4","ImageFileName":"System","Path":"c:\\windows\\system32\\ntoskrnl.exe"}]}"#
                    .to_string()
            }
            "windows.psscan.PsScan" => {
                r#"{"rows":[
                    {"PID":"4","ImageFileName":"System","Path":"c:\\windows\\system32\\ntoskrnl.exe"},
                    {"PID":"666","ImageFileName":"evil.exe","Path":"c:\\users\\bob\\evil.exe"}
                ]}"#
                    .to_string()
            }
            _ => r#"{"rows":[]}"#.to_string(),
        };
        Some((stdout, String::new(), true))
    }
}

#[test]
fn hidden_process_scenario_produces_expected_report() {
    let workdir = tempdir().unwrap();
    let image_path = workdir.path().join("mem.raw");
    std::fs::write(&image_path, b"fake image").unwrap();
    let output_dir = workdir.path().join("out");

    let orchestrator = Orchestrator::with_runner("vol", 2, Arc::new(FakeRunner));
    let handle = orchestrator.run(&image_path, &output_dir).unwrap();

    let iocs = handle.summary.get("iocs").unwrap().as_array().unwrap();
    assert_eq!(iocs.len(), 1);
    assert_eq!(iocs[0].get("kind").unwrap().as_str(), Some("suspicious_process"));
    assert_eq!(iocs[0].get("data").unwrap().get("pid").unwrap().as_i64(), Some(666));
    assert_eq!(
        iocs[0].get("technique_ids").unwrap().as_array().unwrap(),
        &vec![serde_json::Value::from("T1014")]
    );

    let technique_index = handle.summary.get("technique_index").unwrap();
    assert!(technique_index
        .get("T1014")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k.as_str() == Some("suspicious_process")));

    assert!(output_dir.join("memory_report.json").exists());
    assert!(output_dir.join("memory_report.md").exists());
    assert!(output_dir.join("memory_analysis.log").exists());
}
