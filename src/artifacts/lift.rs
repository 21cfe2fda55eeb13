//! Artifact Lifter (C3): maps plugin rows into the typed entities in spec §3.
//!
//! Column lookups try a small ordered list of aliases per field; the first
//! non-empty alias wins. A mandatory integer field that fails to parse causes
//! the row to be skipped (and a warning recorded); an optional one is simply
//! left unset. Strings are trimmed; empty strings become `None` for optional
//! fields. Protection strings are upper-cased.

use crate::artifacts::model::*;

fn alias<'a>(row: &'a Row, aliases: &[&str]) -> Option<&'a str> {
    for key in aliases {
        if let Some(value) = row.get(*key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

fn alias_string(row: &Row, aliases: &[&str]) -> Option<String> {
    alias(row, aliases).map(|s| s.to_string())
}

fn parse_i64(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

fn parse_u16(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok()
}

/// Lifts `windows.pslist.PsList` and `windows.psscan.PsScan` rows (same
/// column shape, different rule usage downstream).
pub fn lift_processes(rows: &[Row], warnings: &mut Vec<String>) -> Vec<Process> {
    let mut processes = Vec::with_capacity(rows.len());
    for row in rows {
        let pid = match alias(row, &["PID", "Pid", "pid"]).and_then(parse_i64) {
            Some(pid) => pid,
            None => {
                warnings.push("skipped a process row with an unparseable PID".to_string());
                continue;
            }
        };
        let ppid = alias(row, &["PPID", "Ppid", "ppid"]).and_then(parse_i64);
        let name = alias_string(row, &["ImageFileName", "Name", "name"]).unwrap_or_default();
        let path = alias_string(row, &["Path", "FilePath", "path"]);
        let create_time = alias_string(row, &["CreateTime", "Created"]);
        let exit_time = alias_string(row, &["ExitTime", "Exited"]);

        processes.push(Process {
            pid,
            ppid,
            name,
            path,
            create_time,
            exit_time,
            flags: Vec::new(),
        });
    }
    processes
}

/// Lifts `windows.dlllist.DllList` rows.
pub fn lift_modules(rows: &[Row], warnings: &mut Vec<String>) -> Vec<LoadedModule> {
    let mut modules = Vec::with_capacity(rows.len());
    for row in rows {
        let pid = match alias(row, &["PID", "Pid", "pid"]).and_then(parse_i64) {
            Some(pid) => pid,
            None => {
                warnings.push("skipped a module row with an unparseable PID".to_string());
                continue;
            }
        };
        let base_name = alias_string(row, &["BaseDllName", "Name"]).unwrap_or_default();
        if base_name.is_empty() {
            continue;
        }
        let full_path = alias_string(row, &["FullDllName", "Path"]).unwrap_or_default();

        modules.push(LoadedModule {
            process_pid: pid,
            base_name,
            full_path,
            flags: Vec::new(),
        });
    }
    modules
}

/// Lifts `windows.driverscan.DriverScan` rows.
pub fn lift_drivers(rows: &[Row], _warnings: &mut [String]) -> Vec<Driver> {
    let mut drivers = Vec::with_capacity(rows.len());
    for row in rows {
        let name = alias_string(row, &["Name", "DriverName"]).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let path = alias_string(row, &["Path", "ServiceKey"]).unwrap_or_default();
        let created = alias_string(row, &["CreateTime", "Created"]);

        drivers.push(Driver { name, path, created, flags: Vec::new() });
    }
    drivers
}

/// Lifts `windows.malware.unhooked_system_calls.UnhookedSystemCalls` rows.
pub fn lift_api_hooks(rows: &[Row]) -> Vec<Hook> {
    let mut hooks = Vec::with_capacity(rows.len());
    for row in rows {
        let function_name = alias_string(row, &["HookedFunction", "Function"]).unwrap_or_default();
        if function_name.is_empty() {
            continue;
        }
        let module = alias_string(row, &["Module", "OwnerModule"]);
        let target = alias_string(row, &["HookingModule", "TargetModule"]);
        let process_pid = alias(row, &["PID", "Pid"]).and_then(parse_i64);

        hooks.push(Hook { process_pid, function_name, module, target, is_suspicious: false });
    }
    hooks
}

/// Lifts `windows.callbacks.Callbacks` rows — same `Hook` shape, different
/// column aliases, concatenated onto the API-hooks list in catalogue order.
pub fn lift_callbacks(rows: &[Row]) -> Vec<Hook> {
    let mut hooks = Vec::with_capacity(rows.len());
    for row in rows {
        let function_name =
            alias_string(row, &["Callback", "Function", "Routine"]).unwrap_or_default();
        if function_name.is_empty() {
            continue;
        }
        let module = alias_string(row, &["Module", "Owner"]);
        let target = alias_string(row, &["Type", "CallbackType"]);
        let process_pid = alias(row, &["PID", "Pid"]).and_then(parse_i64);

        hooks.push(Hook { process_pid, function_name, module, target, is_suspicious: false });
    }
    hooks
}

/// Lifts `windows.malfind.Malfind` rows.
pub fn lift_regions(rows: &[Row]) -> Vec<MemoryRegion> {
    let mut regions = Vec::with_capacity(rows.len());
    for row in rows {
        let pid = alias(row, &["PID", "Pid"]).and_then(parse_i64);
        let process_name = alias_string(row, &["Process", "Name"]).unwrap_or_default();
        let protection = alias_string(row, &["Protection"]).unwrap_or_default().to_uppercase();
        let tag = alias_string(row, &["Tag", "TagName"]).unwrap_or_default().to_uppercase();

        regions.push(MemoryRegion { pid, process_name, protection, tag, is_suspicious: false });
    }
    regions
}

/// Lifts `windows.netscan.NetScan` rows. A malformed port is a mandatory-
/// field failure: the row is skipped.
pub fn lift_connections(rows: &[Row], warnings: &mut Vec<String>) -> Vec<NetworkEndpoint> {
    let mut connections = Vec::with_capacity(rows.len());
    for row in rows {
        let local_port = match alias(row, &["LocalPort"]).and_then(parse_u16) {
            Some(p) => p,
            None => {
                warnings.push("skipped a network row with an unparseable local port".to_string());
                continue;
            }
        };
        let remote_port = match alias(row, &["ForeignPort", "RemotePort"]).and_then(parse_u16) {
            Some(p) => p,
            None => {
                warnings.push("skipped a network row with an unparseable remote port".to_string());
                continue;
            }
        };
        let proto = alias_string(row, &["Proto", "Protocol"]).unwrap_or_default().to_uppercase();
        let local_addr = alias_string(row, &["LocalAddr", "LocalAddress"]).unwrap_or_default();
        let remote_addr = alias_string(row, &["ForeignAddr", "RemoteAddress"]).unwrap_or_default();
        let process_pid = alias(row, &["PID", "Pid"]).and_then(parse_i64);

        connections.push(NetworkEndpoint {
            proto,
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            process_pid,
            is_suspicious: false,
        });
    }
    connections
}

/// Lifts `windows.svclist.SvcList` rows.
pub fn lift_services(rows: &[Row]) -> Vec<Service> {
    let mut services = Vec::with_capacity(rows.len());
    for row in rows {
        let name = alias_string(row, &["Name", "ServiceName"]).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let display_name = alias_string(row, &["DisplayName", "Display"]);
        let path = alias_string(row, &["BinaryPath", "Path", "ImagePath"]);
        let service_type = alias_string(row, &["Type", "ServiceType"]);
        let state = alias_string(row, &["State", "Status"]);
        let pid = alias(row, &["PID", "Pid"]).and_then(parse_i64);

        services.push(Service { name, display_name, path, service_type, state, pid, flags: Vec::new() });
    }
    services
}

/// Lifts `windows.cmdline.CmdLine` rows. PID is mandatory.
pub fn lift_cmdlines(rows: &[Row], warnings: &mut Vec<String>) -> Vec<CommandLine> {
    let mut cmdlines = Vec::with_capacity(rows.len());
    for row in rows {
        let pid = match alias(row, &["PID", "Pid"]).and_then(parse_i64) {
            Some(pid) => pid,
            None => {
                warnings.push("skipped a cmdline row with an unparseable PID".to_string());
                continue;
            }
        };
        let cmdline = alias_string(row, &["CommandLine", "Cmdline", "Command"]).unwrap_or_default();
        cmdlines.push(CommandLine { pid, cmdline });
    }
    cmdlines
}

/// Lifts `windows.ldrmodules.LdrModules` rows.
pub fn lift_loader_records(rows: &[Row], warnings: &mut Vec<String>) -> Vec<LoaderRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let pid = match alias(row, &["PID", "Pid"]).and_then(parse_i64) {
            Some(pid) => pid,
            None => {
                warnings.push("skipped a loader-record row with an unparseable PID".to_string());
                continue;
            }
        };
        let module_name = alias_string(row, &["DllBase", "Name"]).unwrap_or_default();
        let in_load = alias(row, &["InLoad"]).map(|v| v == "True" || v == "1").unwrap_or(false);
        let in_mem = alias(row, &["InMem"]).map(|v| v == "True" || v == "1").unwrap_or(false);
        let in_init = alias(row, &["InInit"]).map(|v| v == "True" || v == "1").unwrap_or(false);

        records.push(LoaderRecord { pid, module_name, in_load, in_mem, in_init });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn process_alias_prefers_first_non_empty() {
        let rows = vec![row(&[("PID", "4"), ("Pid", "999"), ("ImageFileName", "System")])];
        let mut warnings = Vec::new();
        let processes = lift_processes(&rows, &mut warnings);
        assert_eq!(processes[0].pid, 4);
        assert_eq!(processes[0].name, "System");
        assert!(warnings.is_empty());
    }

    #[test]
    fn process_row_skipped_on_bad_pid() {
        let rows = vec![row(&[("PID", "not-a-number")])];
        let mut warnings = Vec::new();
        let processes = lift_processes(&rows, &mut warnings);
        assert!(processes.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn module_lifter_drops_empty_base_name() {
        let rows = vec![row(&[("PID", "4")])];
        let mut warnings = Vec::new();
        let modules = lift_modules(&rows, &mut warnings);
        assert!(modules.is_empty());
    }

    #[test]
    fn region_protection_is_uppercased() {
        let rows = vec![row(&[("Protection", "page_execute_readwrite")])];
        let regions = lift_regions(&rows);
        assert_eq!(regions[0].protection, "PAGE_EXECUTE_READWRITE");
    }

    #[test]
    fn connection_skips_row_on_bad_port() {
        let rows = vec![row(&[("LocalPort", "not-a-port"), ("ForeignPort", "4444")])];
        let mut warnings = Vec::new();
        let connections = lift_connections(&rows, &mut warnings);
        assert!(connections.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
