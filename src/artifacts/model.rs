//! Typed domain entities lifted from plugin rows (spec §3).

use serde::Serialize;
use std::collections::BTreeMap;

/// A single row of tool output: column name -> raw string value.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Default)]
pub struct Process {
    pub pid: i64,
    pub ppid: Option<i64>,
    pub name: String,
    pub path: Option<String>,
    pub create_time: Option<String>,
    pub exit_time: Option<String>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LoadedModule {
    pub process_pid: i64,
    pub base_name: String,
    pub full_path: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Driver {
    pub name: String,
    pub path: String,
    pub created: Option<String>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Hook {
    pub process_pid: Option<i64>,
    pub function_name: String,
    pub module: Option<String>,
    pub target: Option<String>,
    pub is_suspicious: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MemoryRegion {
    pub pid: Option<i64>,
    pub process_name: String,
    pub protection: String,
    pub tag: String,
    pub is_suspicious: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct NetworkEndpoint {
    pub proto: String,
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    pub process_pid: Option<i64>,
    pub is_suspicious: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Service {
    pub name: String,
    pub display_name: Option<String>,
    pub path: Option<String>,
    pub service_type: Option<String>,
    pub state: Option<String>,
    pub pid: Option<i64>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CommandLine {
    pub pid: i64,
    pub cmdline: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LoaderRecord {
    pub pid: i64,
    pub module_name: String,
    pub in_load: bool,
    pub in_mem: bool,
    pub in_init: bool,
}

/// The full set of artifacts lifted from every plugin's rows, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    pub processes: Vec<Process>,
    pub scanned_processes: Vec<Process>,
    pub modules: Vec<LoadedModule>,
    pub drivers: Vec<Driver>,
    pub hooks: Vec<Hook>,
    pub regions: Vec<MemoryRegion>,
    pub connections: Vec<NetworkEndpoint>,
    pub services: Vec<Service>,
    pub cmdlines: Vec<CommandLine>,
    pub loader_records: Vec<LoaderRecord>,
}
