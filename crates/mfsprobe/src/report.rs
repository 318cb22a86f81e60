//! Presentation of discovery results: roster rows, leader summary, plain
//! text tables. Raw wire integers are converted here and nowhere else.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use mfsprobe_protocol::{ClusterSummary, CopyAccounting, MetaloggerEntry, NodeInfo};
use mfsprobe_topology::{Consistency, Endpoint, NodeRole, RosterEntry};

/// One printable roster line.
#[derive(Debug, Clone, Serialize)]
pub struct RosterRow {
    pub endpoint: Endpoint,
    pub role: String,
    pub version: Option<String>,
    pub pro: Option<bool>,
    pub metaversion: Option<u64>,
    pub memory_usage: Option<u64>,
    pub sys_cpu: Option<f64>,
    pub user_cpu: Option<f64>,
    pub last_save: Option<String>,
    pub last_save_secs: Option<f64>,
    pub exports_checksum: Option<String>,
    pub sec_delta: Option<f64>,
    pub meta_delay: Option<f64>,
}

impl RosterRow {
    pub fn new(entry: &RosterEntry, consistency: &Consistency) -> Self {
        let info = entry.info();
        let release = info.map(|i| i.version.release());
        Self {
            endpoint: entry.endpoint,
            role: entry.role.to_string(),
            version: release.map(|r| r.to_string()).filter(|s| !s.is_empty()),
            pro: release.and_then(|r| r.pro),
            metaversion: info.and_then(NodeInfo::metaversion),
            memory_usage: info.and_then(|i| i.memory_usage),
            sys_cpu: info.and_then(NodeInfo::sys_cpu),
            user_cpu: info.and_then(NodeInfo::user_cpu),
            last_save: info
                .and_then(|i| i.last_save)
                .map(|s| format_timestamp(s.timestamp)),
            last_save_secs: info.and_then(NodeInfo::last_save_secs),
            exports_checksum: info
                .and_then(|i| i.exports_checksum)
                .map(|c| hex::encode(c.to_be_bytes())),
            sec_delta: info
                .filter(|i| i.clock.is_some())
                .map(|i| consistency.sec_delta(i)),
            meta_delay: info.and_then(|i| consistency.meta_delay(i)),
        }
    }
}

pub fn roster_rows(entries: &[RosterEntry], consistency: &Consistency) -> Vec<RosterRow> {
    entries
        .iter()
        .map(|e| RosterRow::new(e, consistency))
        .collect()
}

/// Epoch seconds as UTC text. 0 means "never".
pub fn format_timestamp(ts: u32) -> String {
    if ts == 0 {
        return "-".into();
    }
    DateTime::<Utc>::from_timestamp(i64::from(ts), 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Binary-prefixed byte count, e.g. `1.5 GiB`.
pub fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn opt_secs(v: Option<f64>) -> String {
    v.map(|s| format!("{s:.2}s")).unwrap_or_else(|| "-".into())
}

pub fn render_roster(rows: &[RosterRow], consistency: &Consistency) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<21} {:<26} {:<12} {:>14} {:>10} {:<19} {:>9} {:>9}",
        "endpoint", "state", "version", "metaversion", "memory", "last save", "skew", "delay"
    );
    for r in rows {
        let _ = writeln!(
            out,
            "{:<21} {:<26} {:<12} {:>14} {:>10} {:<19} {:>9} {:>9}",
            r.endpoint.key(),
            r.role,
            opt(r.version.as_deref()),
            opt(r.metaversion),
            opt(r.memory_usage.map(human_bytes)),
            opt(r.last_save.as_deref()),
            opt_secs(r.sec_delta),
            opt_secs(r.meta_delay),
        );
    }
    if consistency.highest_saved_metaversion > 0 {
        let _ = writeln!(
            out,
            "highest saved metaversion: {} (checksum {})",
            consistency.highest_saved_metaversion,
            hex::encode(consistency.highest_metaversion_checksum.to_be_bytes())
        );
    }
    out
}

/// Active master summary.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderReport {
    pub endpoint: Endpoint,
    pub role: NodeRole,
    pub version: String,
    pub summary: Option<ClusterSummary>,
}

pub fn render_leader(report: &LeaderReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "master:   {} ({})", report.endpoint, report.role);
    let _ = writeln!(out, "version:  {}", report.version);
    let Some(s) = &report.summary else {
        return out;
    };
    let _ = writeln!(out, "memory:   {}", human_bytes(s.memory_usage));
    let _ = writeln!(out, "cpu:      sys {:.2}% user {:.2}%", s.sys_cpu, s.user_cpu);
    let _ = writeln!(
        out,
        "space:    total {} avail {}{}",
        human_bytes(s.total_space),
        human_bytes(s.avail_space),
        s.free_space
            .map(|f| format!(" free {}", human_bytes(f)))
            .unwrap_or_default()
    );
    let _ = writeln!(
        out,
        "trash:    {} in {} files",
        human_bytes(s.trash_space),
        s.trash_files
    );
    let _ = writeln!(
        out,
        "sustained: {} in {} files",
        human_bytes(s.sustained_space),
        s.sustained_files
    );
    let _ = writeln!(
        out,
        "objects:  {} nodes, {} dirs, {} files, {} chunks",
        s.nodes, s.dirs, s.files, s.chunks
    );
    match s.accounting {
        CopyAccounting::Copies {
            all_copies,
            regular_copies,
        } => {
            let _ = writeln!(out, "copies:   {all_copies} all, {regular_copies} regular");
        }
        CopyAccounting::MetaInfo {
            copy_chunks,
            ec8_chunks,
            ec4_chunks,
            ..
        } => {
            let _ = writeln!(
                out,
                "chunks:   {copy_chunks} copy, {ec8_chunks} ec8, {ec4_chunks} ec4"
            );
        }
    }
    let _ = writeln!(
        out,
        "saved:    {} ({:.1}s)",
        format_timestamp(s.last_save.timestamp),
        s.last_save_secs
    );
    out
}

pub fn render_metaloggers(entries: &[MetaloggerEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(out, "{:<15} {}", e.ip, e.version.release());
    }
    out
}
