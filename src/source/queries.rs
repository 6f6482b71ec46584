//! SQL sent to osquery.

pub(crate) const APPS: &str = "SELECT display_name, bundle_name, bundle_identifier, \
     bundle_version, last_opened_time, path FROM apps;";

pub(crate) const OS_VERSION: &str = "SELECT name, version, platform, platform_like, arch \
     FROM os_version;";

pub(crate) const UPTIME: &str = "SELECT total_seconds FROM uptime;";

pub(crate) const MAC_ADDRESS: &str = "SELECT mac FROM interface_details \
     WHERE mac IS NOT NULL AND mac != '' AND mac != '00:00:00:00:00:00' LIMIT 1;";

pub(crate) const OSQUERY_VERSION: &str = "SELECT version FROM osquery_info;";

/// Processes whose executable lives inside one of the given app bundles.
pub(crate) fn running_processes(bundle_ids: &[String]) -> String {
    let ids = bundle_ids
        .iter()
        .map(|id| quote(id))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT p.pid, p.name, a.bundle_identifier, a.bundle_version, p.path \
         FROM processes p JOIN apps a ON p.path LIKE a.path || '/%' \
         WHERE a.bundle_identifier IN ({ids});"
    )
}

/// Render `value` as a SQL string literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
