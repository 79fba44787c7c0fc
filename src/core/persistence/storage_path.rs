use std::path::{Path, PathBuf};

use chrono::NaiveDate;

pub fn crisis_alert_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("alerts")
}

pub fn crisis_alert_path(data_dir: &Path, alert_id: &str) -> PathBuf {
    crisis_alert_dir(data_dir).join(format!("{}.json", sanitize_key(alert_id)))
}

pub fn audit_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("audit")
}

pub fn audit_day_file_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    audit_dir(data_dir).join(format!("{}.jsonl", date.format("%Y-%m-%d")))
}

/// Alert IDs are generated UUIDs, but anything arriving over the API is
/// untrusted; keep it to a single safe path segment.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_path_cannot_escape_alert_dir() {
        let base = Path::new("/var/lib/crisis");
        let path = crisis_alert_path(base, "../../etc/passwd");
        assert_eq!(path, PathBuf::from("/var/lib/crisis/alerts/______etc_passwd.json"));
    }
}
