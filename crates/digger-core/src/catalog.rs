//! Site catalog CSV I/O
//!
//! The catalog is a CSV file with the header
//! `Hostname,Port,EntityName,IP,OldIP,NewIP,ChangeTime`. The `IP` cell may
//! hold several `;`-separated addresses. The last three columns describe the
//! most recent change; they are optional when reading and always written.

use crate::error::{Error, Result};
use crate::model::{LastChange, Site, join_ips, parse_ip_list};
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Column names, in file order
pub const HEADER: [&str; 7] = [
    "Hostname",
    "Port",
    "EntityName",
    "IP",
    "OldIP",
    "NewIP",
    "ChangeTime",
];

/// Columns every row must have
const REQUIRED_COLUMNS: usize = 4;

/// Read the catalog at `path`
pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<Site>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::catalog(format!("Failed to open catalog {}: {}", path.display(), e))
    })?;
    read_from(file).map_err(|e| match e {
        Error::Catalog(msg) => Error::catalog(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Read catalog rows from any reader
pub fn read_from<R: Read>(reader: R) -> Result<Vec<Site>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    check_header(rdr.headers()?)?;

    let mut sites = Vec::new();
    let mut seen = HashSet::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let site = parse_row(&record)
            .map_err(|msg| Error::catalog(format!("line {}: {}", line, msg)))?;
        if !seen.insert(site.hostname.clone()) {
            return Err(Error::catalog(format!(
                "line {}: duplicate hostname '{}'",
                line, site.hostname
            )));
        }
        sites.push(site);
    }

    tracing::debug!("Loaded {} sites from catalog", sites.len());
    Ok(sites)
}

fn check_header(header: &StringRecord) -> Result<()> {
    let matches = header.len() >= REQUIRED_COLUMNS
        && HEADER
            .iter()
            .zip(header.iter())
            .all(|(expected, actual)| expected.eq_ignore_ascii_case(actual));
    if !matches {
        return Err(Error::catalog(format!(
            "unexpected header '{}', expected '{}'",
            header.iter().collect::<Vec<_>>().join(","),
            HEADER.join(",")
        )));
    }
    Ok(())
}

fn parse_row(record: &StringRecord) -> std::result::Result<Site, String> {
    if record.len() < REQUIRED_COLUMNS {
        return Err(format!(
            "expected at least {} columns, found {}",
            REQUIRED_COLUMNS,
            record.len()
        ));
    }

    let hostname = record.get(0).unwrap_or_default();
    if hostname.is_empty() {
        return Err("hostname is empty".to_string());
    }

    let port_cell = record.get(1).unwrap_or_default();
    let port: u16 = port_cell
        .parse()
        .map_err(|e| format!("invalid port '{}' for {}: {}", port_cell, hostname, e))?;

    let mut site = Site::new(hostname, port, record.get(2).unwrap_or_default())
        .with_known_ips(parse_ip_list(record.get(3).unwrap_or_default()));

    let change_time = record.get(6).unwrap_or_default();
    if !change_time.is_empty() {
        let changed_at = DateTime::parse_from_rfc3339(change_time)
            .map_err(|e| format!("invalid ChangeTime '{}' for {}: {}", change_time, hostname, e))?
            .with_timezone(&Utc);
        site.last_change = Some(LastChange {
            old_ips: parse_ip_list(record.get(4).unwrap_or_default()),
            new_ip: record.get(5).unwrap_or_default().to_string(),
            changed_at,
        });
    }

    Ok(site)
}

/// Write the catalog to `path` atomically (temp file, then rename)
pub fn write_catalog<P: AsRef<Path>>(path: P, sites: &[Site]) -> Result<()> {
    let path = path.as_ref();
    let temp_path = temp_path(path);

    let file = File::create(&temp_path)
        .map_err(|e| Error::catalog(format!("Failed to create {}: {}", temp_path.display(), e)))?;
    write_to(&file, sites)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| Error::catalog(format!("Failed to replace catalog {}: {}", path.display(), e)))?;

    tracing::debug!("Wrote {} sites to {}", sites.len(), path.display());
    Ok(())
}

/// Write catalog rows, header included, to any writer
pub fn write_to<W: Write>(writer: W, sites: &[Site]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER)?;

    for site in sites {
        let (old_ip, new_ip, change_time) = match &site.last_change {
            Some(change) => (
                join_ips(&change.old_ips),
                change.new_ip.clone(),
                change
                    .changed_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            None => (String::new(), String::new(), String::new()),
        };

        let port = site.port.to_string();
        let ips = site.known_ips_joined();
        wtr.write_record([
            site.hostname.as_str(),
            port.as_str(),
            site.entity_name.as_str(),
            ips.as_str(),
            old_ip.as_str(),
            new_ip.as_str(),
            change_time.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
