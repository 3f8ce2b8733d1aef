use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL log of what happened during one session.
///
/// Credentials other than the email are never written.
pub struct Journal {
    pub path: PathBuf,
    session_id: String,
    cwd: PathBuf,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    cwd: &'a Path,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Journal {
    pub fn new(path: &Path, session_id: &str, cwd: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            cwd: cwd.to_path_buf(),
            file,
        })
    }

    /// Create `<dir>/<session_id>.jsonl`, making `dir` if needed
    pub fn in_dir(dir: &Path, session_id: &str, cwd: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create journal dir {}", dir.display()))?;
        Self::new(&dir.join(format!("{}.jsonl", session_id)), session_id, cwd)
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            cwd: &self.cwd,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn session_start(&mut self, store: &Path, accounts: usize) -> Result<()> {
        self.log(
            "session_start",
            serde_json::json!({ "store": store, "accounts": accounts }),
        )
    }

    pub fn login_ok(&mut self, email: &str) -> Result<()> {
        self.log("login_ok", serde_json::json!({ "email": email }))
    }

    /// `reason` is `validation` or `authentication`
    pub fn login_failed(&mut self, email: &str, reason: &str) -> Result<()> {
        self.log(
            "login_failed",
            serde_json::json!({ "email": email, "reason": reason }),
        )
    }

    pub fn register_ok(&mut self, email: &str) -> Result<()> {
        self.log("register_ok", serde_json::json!({ "email": email }))
    }

    /// Log a rejected registration with the offending field names
    pub fn register_rejected(&mut self, email: &str, fields: &[&str]) -> Result<()> {
        self.log(
            "register_rejected",
            serde_json::json!({ "email": email, "fields": fields }),
        )
    }

    pub fn logout(&mut self, email: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "email": email }))
    }

    pub fn navigate(&mut self, from: &str, to: &str) -> Result<()> {
        self.log("navigate", serde_json::json!({ "from": from, "to": to }))
    }

    pub fn stopwatch_start(&mut self, restarted: bool) -> Result<()> {
        self.log(
            "stopwatch_start",
            serde_json::json!({ "restarted": restarted }),
        )
    }

    pub fn stopwatch_stop(&mut self, elapsed_ms: u64, repetitions: u32) -> Result<()> {
        self.log(
            "stopwatch_stop",
            serde_json::json!({
                "elapsed_ms": elapsed_ms,
                "repetitions": repetitions,
            }),
        )
    }

    pub fn contact_opened(&mut self, link: &str, ok: bool) -> Result<()> {
        self.log(
            "contact_opened",
            serde_json::json!({ "link": link, "ok": ok }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_events(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_events_are_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut journal = Journal::in_dir(&dir.path().join("sessions"), "abc", dir.path()).unwrap();

        journal.session_start(Path::new("users.json"), 2).unwrap();
        journal.login_ok("a@x.com").unwrap();
        journal.stopwatch_stop(65_420, 3).unwrap();

        assert_eq!(journal.path, dir.path().join("sessions").join("abc.jsonl"));
        let events = read_events(&journal.path);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["type"], "session_start");
        assert_eq!(events[0]["accounts"], 2);
        assert_eq!(events[1]["session_id"], "abc");
        assert_eq!(events[1]["email"], "a@x.com");
        assert_eq!(events[2]["elapsed_ms"], 65_420);
        assert!(events[2]["ts"].as_str().is_some());
    }

    #[test]
    fn test_reopening_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        Journal::new(&path, "s", dir.path())
            .unwrap()
            .logout("a@x.com")
            .unwrap();
        Journal::new(&path, "s", dir.path())
            .unwrap()
            .navigate("home", "stopwatch")
            .unwrap();

        let events = read_events(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["to"], "stopwatch");
    }

    #[test]
    fn test_register_rejected_lists_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut journal = Journal::new(&path, "s", dir.path()).unwrap();
        journal
            .register_rejected("a@x.com", &["email", "confirm_password"])
            .unwrap();

        let events = read_events(&path);
        assert_eq!(
            events[0]["fields"],
            serde_json::json!(["email", "confirm_password"])
        );
        assert!(events[0].get("password").is_none());
    }
}
