//! Append-only chat logs: broadcast bodies and the command audit trail

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Storage for the public message log and the command audit log
///
/// Both logs are line oriented and only ever appended to.
pub trait ChatLog {
    /// Records one broadcast message body
    fn append_public(&mut self, body: &str) -> io::Result<()>;

    /// Records `"<username>: <command>"`
    fn append_command(&mut self, username: &str, command: &str) -> io::Result<()>;

    /// Every public line in broadcast order, or None if nothing was ever logged
    fn read_public(&self) -> io::Result<Option<Vec<String>>>;
}

/// Plain text files on disk, one entry per line
#[derive(Debug, Clone)]
pub struct FileChatLog {
    public_path: PathBuf,
    command_path: PathBuf,
}

impl FileChatLog {
    pub fn new(public_path: impl Into<PathBuf>, command_path: impl Into<PathBuf>) -> Self {
        Self {
            public_path: public_path.into(),
            command_path: command_path.into(),
        }
    }

    pub fn public_path(&self) -> &Path {
        &self.public_path
    }

    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    fn append_line(path: &Path, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}

impl ChatLog for FileChatLog {
    fn append_public(&mut self, body: &str) -> io::Result<()> {
        Self::append_line(&self.public_path, body)
    }

    fn append_command(&mut self, username: &str, command: &str) -> io::Result<()> {
        Self::append_line(&self.command_path, &format!("{}: {}", username, command))
    }

    fn read_public(&self) -> io::Result<Option<Vec<String>>> {
        match fs::read_to_string(&self.public_path) {
            Ok(contents) => Ok(Some(contents.lines().map(str::to_string).collect())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// In-memory logs, used by tests and embedders that don't want files
#[derive(Debug, Default, Clone)]
pub struct MemoryChatLog {
    pub public: Vec<String>,
    pub commands: Vec<String>,
}

impl MemoryChatLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatLog for MemoryChatLog {
    fn append_public(&mut self, body: &str) -> io::Result<()> {
        self.public.push(body.to_string());
        Ok(())
    }

    fn append_command(&mut self, username: &str, command: &str) -> io::Result<()> {
        self.commands.push(format!("{}: {}", username, command));
        Ok(())
    }

    fn read_public(&self) -> io::Result<Option<Vec<String>>> {
        if self.public.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.public.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_public_log() {
        let dir = tempdir().unwrap();
        let log = FileChatLog::new(dir.path().join("public.log"), dir.path().join("cmd.log"));
        assert_eq!(log.read_public().unwrap(), None);
    }

    #[test]
    fn test_file_log_appends_in_order() {
        let dir = tempdir().unwrap();
        let mut log = FileChatLog::new(dir.path().join("public.log"), dir.path().join("cmd.log"));

        log.append_public("first").unwrap();
        log.append_public("second message").unwrap();
        assert_eq!(
            log.read_public().unwrap(),
            Some(vec!["first".to_string(), "second message".to_string()])
        );

        // A fresh handle sees the same file
        let reopened = FileChatLog::new(log.public_path(), log.command_path());
        assert_eq!(reopened.read_public().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_file_command_log_format() {
        let dir = tempdir().unwrap();
        let mut log = FileChatLog::new(dir.path().join("public.log"), dir.path().join("cmd.log"));

        log.append_command("alice", "~help").unwrap();
        log.append_command("bob", "~getlog").unwrap();

        let contents = fs::read_to_string(log.command_path()).unwrap();
        assert_eq!(contents, "alice: ~help\nbob: ~getlog\n");
    }

    #[test]
    fn test_memory_log() {
        let mut log = MemoryChatLog::new();
        assert_eq!(log.read_public().unwrap(), None);

        log.append_public("hi").unwrap();
        log.append_command("alice", "~getlist").unwrap();

        assert_eq!(log.read_public().unwrap(), Some(vec!["hi".to_string()]));
        assert_eq!(log.commands, vec!["alice: ~getlist".to_string()]);
    }
}
