//! Messaging contact behind the promotional cards.
//!
//! The contact number is an opaque string; it is dropped into the link
//! as-is and never validated.

use anyhow::{Context, Result};
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// Default messaging contact for class and trainer enquiries
pub const CONTACT_NUMBER: &str = "5511939222617";

/// Deep link that opens a chat with `number`
pub fn contact_link(number: &str) -> String {
    format!("https://wa.me/{}", number)
}

/// Something that can open a URL for the user
pub trait UrlLauncher {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Hands URLs to the platform opener
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(url: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl UrlLauncher for SystemLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        let mut cmd = Self::command(url);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Dropping the handle detaches the waiter thread
        let _waiter =
            spawn_reaped(&mut cmd).with_context(|| format!("Failed to open {}", url))?;
        Ok(())
    }
}

/// Spawn `cmd` and wait for it on a background thread so the exited
/// opener is reaped instead of lingering as a zombie.
fn spawn_reaped(cmd: &mut Command) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let mut child = cmd.spawn()?;
    Ok(thread::spawn(move || child.wait()))
}

/// Build the link for `number` and hand it to `launcher`. Returns the link.
pub fn open_contact(launcher: &dyn UrlLauncher, number: &str) -> Result<String> {
    let link = contact_link(number);
    launcher.launch(&link)?;
    Ok(link)
}
