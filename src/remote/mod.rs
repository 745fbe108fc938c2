//! Filesystem, search and shell operations carried out through a command
//! channel.
//!
//! Each operation module builds command strings with [`command`], runs them
//! over a [`channel::CommandChannel`] and shapes the output with
//! [`crate::truncate`].

pub mod channel;
pub mod command;
pub mod exec;
pub mod file_io;
pub mod find;
pub mod grep;
pub mod ls;
pub mod path;

use crate::error::{Error, Result};
use channel::CommandChannel;
use command::{command_exists, test_path};
use path::PathPair;

/// A command channel paired with the path translation for its root.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub channel: CommandChannel,
    pub paths: PathPair,
}

impl Workspace {
    pub const fn new(channel: CommandChannel, paths: PathPair) -> Self {
        Self { channel, paths }
    }

    /// Resolve a tool-supplied path against the remote root.
    pub fn resolve(&self, path: Option<&str>) -> String {
        self.paths.to_remote(path)
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.channel.check(test_path("-e", path).as_str()).await
    }

    pub async fn is_dir(&self, path: &str) -> bool {
        self.channel.check(test_path("-d", path).as_str()).await
    }

    pub async fn is_readable(&self, path: &str) -> bool {
        self.channel.check(test_path("-r", path).as_str()).await
    }

    /// Fail with path-not-found or not-a-directory before running a listing.
    pub async fn require_directory(&self, path: &str) -> Result<()> {
        if !self.exists(path).await {
            return Err(Error::PathNotFound(path.to_string()));
        }
        if !self.is_dir(path).await {
            return Err(Error::NotADirectory(path.to_string()));
        }
        Ok(())
    }

    /// Fail with tool-unavailable unless `program` is on the host's PATH.
    pub async fn require_program(&self, program: &str) -> Result<()> {
        let found = self
            .channel
            .check(command_exists(program).login_shell().as_str())
            .await;
        if found {
            Ok(())
        } else {
            Err(Error::ToolUnavailable(program.to_string()))
        }
    }
}
