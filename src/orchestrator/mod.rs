//! Pipeline Orchestrator (C7): the `run(image_path, output_directory)`
//! contract from spec §4.7, wiring the Driver, Parser, Lifter, Correlation
//! Engine, Technique Mapper and Report Builder together.

use crate::artifacts::model::ArtifactSet;
use crate::artifacts::{lift, model::Row};
use crate::correlate;
use crate::driver::catalogue::{PluginEntry, CATALOGUE, HOOK_PLUGINS, INFO_PLUGIN};
use crate::driver::{self, CommandRunner, PluginInvocation, SubprocessRunner};
use crate::error::{AnalysisError, Result};
use crate::report::{self, PluginStatus, ReportInput};
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::SystemTime;

/// Result handed back to the caller: the in-memory summary plus the paths
/// the Report Builder actually wrote to (spec §4.7 step 7).
pub struct RunHandle {
    pub summary: serde_json::Value,
    pub markdown: String,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
    pub log_path: PathBuf,
}

/// Drives one end-to-end run. `binary` names the external memory-forensics
/// engine executable (spec §6); `concurrency` bounds how many plugin
/// invocations run at once (spec §5). The `CommandRunner` is pluggable so
/// tests can exercise the full pipeline against canned subprocess output
/// instead of a real external tool.
pub struct Orchestrator {
    binary: String,
    concurrency: usize,
    cancel: Arc<AtomicBool>,
    runner: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(binary: impl Into<String>, concurrency: usize) -> Self {
        Self::with_runner(binary, concurrency, Arc::new(SubprocessRunner))
    }

    pub fn with_runner(binary: impl Into<String>, concurrency: usize, runner: Arc<dyn CommandRunner>) -> Self {
        Orchestrator {
            binary: binary.into(),
            concurrency: concurrency.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
            runner,
        }
    }

    /// A clone of the cancellation flag; setting it stops new plugin
    /// invocations from starting (spec §5 cancellation contract).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&self, image_path: &Path, output_directory: &Path) -> Result<RunHandle> {
        if !image_path.exists() {
            return Err(AnalysisError::ImageNotFound(image_path.to_path_buf()));
        }

        fs::create_dir_all(output_directory).map_err(AnalysisError::OutputWriteFailure)?;
        fs::create_dir_all(output_directory.join("raw")).map_err(AnalysisError::OutputWriteFailure)?;

        let mut run_log = RunLog::open(output_directory)?;
        run_log.info(&format!("starting analysis of {}", image_path.display()));

        let info_invocation =
            driver::invoke(self.runner.as_ref(), &self.binary, INFO_PLUGIN, image_path, &[]);
        let symbol_error = info_invocation.is_symbol_error();
        if symbol_error {
            run_log.warn("kernel symbols missing — analysis will be limited");
        }

        let invocations = self.invoke_catalogue(image_path, &mut run_log);

        let mut plugin_status: Vec<(String, PluginStatus)> = Vec::new();
        plugin_status.push((INFO_PLUGIN.to_string(), to_status(&info_invocation)));
        let mut attempted = 1usize;
        let mut ok_count = if info_invocation.error.is_none() { 1 } else { 0 };
        let mut raw_outputs: Vec<(String, String)> = Vec::new();

        raw_outputs.push((INFO_PLUGIN.to_string(), raw_text(&info_invocation)));

        for entry in CATALOGUE {
            if entry.skip_reason.is_some() {
                run_log.info(&format!("skipping plugin {} ({})", entry.name, entry.skip_reason.unwrap()));
                continue;
            }
            attempted += 1;
            let invocation = invocations.get(entry.name).cloned().unwrap_or_default();
            if invocation.error.is_none() {
                ok_count += 1;
            }
            for warning in &invocation.warnings {
                run_log.warn(&format!("{}: {}", entry.name, warning));
            }
            raw_outputs.push((entry.name.to_string(), raw_text(&invocation)));
            plugin_status.push((entry.name.to_string(), to_status(&invocation)));
        }

        let analysis_status = if ok_count == 0 {
            "failed_no_valid_plugins"
        } else if ok_count < attempted.div_ceil(2) {
            "partial"
        } else {
            "ok"
        };
        run_log.info(&format!("analysis_status={} ({}/{} plugins ok)", analysis_status, ok_count, attempted));

        let mut artifacts = lift_all(&invocations, &mut run_log);

        let correlation = correlate::run(&mut artifacts);
        run_log.info(&format!(
            "correlation produced {} indicators, confidence={}",
            correlation.indicators.len(),
            correlation.confidence.as_str()
        ));

        let report_input = ReportInput {
            image_path: image_path.to_string_lossy().into_owned(),
            analysis_time: iso8601_now(),
            plugin_status,
            analysis_status: analysis_status.to_string(),
            symbol_error,
            info_invocation: &info_invocation,
            artifacts: &artifacts,
            correlation: &correlation,
        };

        let json = report::build_json(&report_input);
        let markdown = report::build_markdown(&report_input, &json);
        report::write_reports(output_directory, &json, &markdown)?;
        report::write_raw_outputs(output_directory, &raw_outputs)?;

        let json_path = output_directory.join("memory_report.json");
        let markdown_path = output_directory.join("memory_report.md");
        run_log.info(&format!("wrote {} and {}", json_path.display(), markdown_path.display()));

        Ok(RunHandle { summary: json, markdown, json_path, markdown_path, log_path: run_log.path.clone() })
    }

    /// Runs every non-skipped catalogue plugin with bounded concurrency,
    /// respecting cancellation. A fixed pool of worker threads pulls plugin
    /// names off a shared queue; setting `self.cancel` stops workers from
    /// picking up new work but lets in-flight invocations finish (spec §5
    /// cancellation contract). Returns results keyed by plugin name; the
    /// caller re-imposes catalogue order when aggregating.
    fn invoke_catalogue(&self, image_path: &Path, run_log: &mut RunLog) -> HashMap<String, PluginInvocation> {
        let queue: Mutex<VecDeque<&PluginEntry>> = Mutex::new(
            CATALOGUE.iter().filter(|e| e.skip_reason.is_none()).collect(),
        );

        let (tx, rx) = mpsc::channel();
        let worker_count = self.concurrency.min(queue.lock().unwrap().len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || loop {
                    if self.cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let entry = {
                        let mut q = queue.lock().unwrap();
                        q.pop_front()
                    };
                    let Some(entry) = entry else { break };
                    let extra_args: Vec<String> = entry.extra_args.iter().map(|a| a.to_string()).collect();
                    let invocation =
                        driver::invoke(self.runner.as_ref(), &self.binary, entry.name, image_path, &extra_args);
                    let _ = tx.send((entry.name.to_string(), invocation));
                });
            }
        });
        drop(tx);

        if self.cancel.load(Ordering::SeqCst) {
            run_log.warn("cancellation requested — remaining plugins were not started");
        }

        rx.into_iter().collect()
    }
}

fn to_status(invocation: &PluginInvocation) -> PluginStatus {
    PluginStatus {
        ok: invocation.error.is_none(),
        error: invocation.error.clone(),
        row_count: invocation.rows.len(),
        warnings: invocation.warnings.clone(),
    }
}

fn raw_text(invocation: &PluginInvocation) -> String {
    if let Some(error) = &invocation.error {
        format!("ERROR: {}\n", error)
    } else {
        invocation
            .rows
            .iter()
            .map(|row| format!("{:?}", row))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn rows_for<'a>(invocations: &'a HashMap<String, PluginInvocation>, plugin: &str) -> &'a [Row] {
    invocations.get(plugin).map(|i| i.rows.as_slice()).unwrap_or(&[])
}

fn lift_all(invocations: &HashMap<String, PluginInvocation>, run_log: &mut RunLog) -> ArtifactSet {
    let mut warnings = Vec::new();
    let mut artifacts = ArtifactSet {
        processes: lift::lift_processes(rows_for(invocations, "windows.pslist.PsList"), &mut warnings),
        scanned_processes: lift::lift_processes(rows_for(invocations, "windows.psscan.PsScan"), &mut warnings),
        modules: lift::lift_modules(rows_for(invocations, "windows.dlllist.DllList"), &mut warnings),
        drivers: lift::lift_drivers(rows_for(invocations, "windows.driverscan.DriverScan"), &mut warnings),
        hooks: Vec::new(),
        regions: lift::lift_regions(rows_for(invocations, "windows.malfind.Malfind")),
        connections: lift::lift_connections(rows_for(invocations, "windows.netscan.NetScan"), &mut warnings),
        services: lift::lift_services(rows_for(invocations, "windows.svclist.SvcList")),
        cmdlines: lift::lift_cmdlines(rows_for(invocations, "windows.cmdline.CmdLine"), &mut warnings),
        loader_records: lift::lift_loader_records(
            rows_for(invocations, "windows.ldrmodules.LdrModules"),
            &mut warnings,
        ),
    };

    // Hook-exposing plugins are concatenated in catalogue order (spec §4.7
    // step 6, §5).
    for plugin in HOOK_PLUGINS {
        let rows = rows_for(invocations, plugin);
        let mut hooks = if plugin == "windows.callbacks.Callbacks" {
            lift::lift_callbacks(rows)
        } else {
            lift::lift_api_hooks(rows)
        };
        artifacts.hooks.append(&mut hooks);
    }

    for warning in &warnings {
        run_log.warn(warning);
    }
    artifacts
}

fn iso8601_now() -> String {
    let now = SystemTime::now();
    let datetime: chrono::DateTime<chrono::Utc> = now.into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Appends timestamped operational-event lines to `D/memory_analysis.log`
/// while also emitting the same events through the `log` crate for console
/// visibility (spec §6 "log file ... captures operational events").
struct RunLog {
    file: fs::File,
    path: PathBuf,
}

impl RunLog {
    fn open(output_directory: &Path) -> Result<Self> {
        let path = output_directory.join("memory_analysis.log");
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(AnalysisError::OutputWriteFailure)?;
        Ok(RunLog { file, path })
    }

    fn write_line(&mut self, level: &str, message: &str) {
        let line = format!("{} [{}] {}\n", iso8601_now(), level, message);
        let _ = self.file.write_all(line.as_bytes());
    }

    fn info(&mut self, message: &str) {
        info!("{}", message);
        self.write_line("INFO", message);
    }

    fn warn(&mut self, message: &str) {
        warn!("{}", message);
        self.write_line("WARN", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn image_not_found_is_reported_without_touching_output() {
        let orchestrator = Orchestrator::new("vol", 2);
        let output = tempdir().unwrap();
        let missing = output.path().join("does-not-exist.raw");

        let result = orchestrator.run(&missing, output.path().join("out").as_path());
        assert!(matches!(result, Err(AnalysisError::ImageNotFound(_))));
    }
}
