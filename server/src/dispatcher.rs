//! Command parsing and execution
//!
//! A decoded text line is either one of the `~` commands or a chat message.
//! Executing it mutates the session table and produces the frames to send;
//! the multiplexing loop does the actual sending.

use crate::chat_log::ChatLog;
use crate::connection::ConnectionId;
use crate::error::AuthError;
use crate::session::SessionTable;
use log::error;
use shared::MAX_TEXT_LEN;

pub const WELCOME_MESSAGE: &str =
    "Welcome to the Chat Server! Use ' ~ ' for commands and '~help' to see all commands available\n";

const HELP_LINES: [&str; 8] = [
    "Available Commands:\n",
    "~help      - Show this help message\n",
    "~getlist   - Shows a list of online clients\n",
    "~logout    - Disconnects you from the Server\n",
    "~login     - Login with username and password\n",
    "~register  - Register your account <username> <password>\n",
    "~send <username> <message> - Send private message\n",
    "~getlog    - Show the public message log\n",
];

const NOT_LOGGED_IN: &str = "You must be logged in to send messages.\n";

/// A parsed client line. Missing arguments are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Register { username: &'a str, password: &'a str },
    Login { username: &'a str, password: &'a str },
    GetList,
    Logout,
    Send { target: &'a str, body: &'a str },
    GetLog,
    Chat(&'a str),
}

impl<'a> Command<'a> {
    /// `~help`, `~getlist`, `~logout` and `~getlog` must match exactly;
    /// `~register` and `~login` match as prefixes; `~send` needs its trailing space.
    pub fn parse(line: &'a str) -> Self {
        if line == "~help" {
            Command::Help
        } else if line.starts_with("~register") {
            let (username, password) = two_args(line);
            Command::Register { username, password }
        } else if line.starts_with("~login") {
            let (username, password) = two_args(line);
            Command::Login { username, password }
        } else if line == "~getlist" {
            Command::GetList
        } else if line == "~logout" {
            Command::Logout
        } else if line.starts_with("~send ") {
            let (_, rest) = split_token(line);
            let (target, rest) = split_token(rest);
            let body = rest.strip_prefix(' ').unwrap_or(rest);
            Command::Send { target, body }
        } else if line == "~getlog" {
            Command::GetLog
        } else {
            Command::Chat(line)
        }
    }

    /// Audit log form of the command. Passwords and private bodies are left out.
    pub fn audit_entry(&self) -> Option<String> {
        let entry = match self {
            Command::Help => Some("~help".to_string()),
            Command::Register { username, .. } => Some(format!("~register {}", username)),
            Command::Login { username, .. } => Some(format!("~login {}", username)),
            Command::GetList => Some("~getlist".to_string()),
            Command::Logout => Some("~logout".to_string()),
            Command::Send { target, .. } => Some(format!("~send {}", target)),
            Command::GetLog => Some("~getlog".to_string()),
            Command::Chat(_) => None,
        };
        entry.map(|e| e.trim_end().to_string())
    }
}

fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, ""),
    }
}

fn two_args(line: &str) -> (&str, &str) {
    let mut tokens = line.split_whitespace().skip(1);
    (tokens.next().unwrap_or(""), tokens.next().unwrap_or(""))
}

/// One text frame addressed to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub text: String,
}

/// Everything a command produced: frames in send order, and whether the
/// originating connection must be closed once they are queued.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub deliveries: Vec<Delivery>,
    pub close: bool,
}

impl Outcome {
    fn send(&mut self, to: ConnectionId, text: impl Into<String>) {
        self.deliveries.push(Delivery {
            to,
            text: text.into(),
        });
    }
}

/// Strips every `\n` and `\r` from a decoded line
pub fn normalize_line(line: &str) -> String {
    line.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Executes one normalized line from `from`
pub fn dispatch(
    sessions: &mut SessionTable,
    log: &mut dyn ChatLog,
    from: ConnectionId,
    line: &str,
) -> Outcome {
    let command = Command::parse(line);
    let mut outcome = Outcome::default();

    match command {
        Command::Help => {
            audit(sessions, log, from, &command);
            for help_line in HELP_LINES {
                outcome.send(from, help_line);
            }
        }
        Command::Register { username, password } => {
            audit(sessions, log, from, &command);
            let reply = if username.is_empty() || password.is_empty() {
                "Usage: ~register <username> <password>\n".to_string()
            } else {
                match sessions.register(username, password) {
                    Ok(()) => "Registration successful! You may now log in.\n".to_string(),
                    Err(err) => auth_reply(&err),
                }
            };
            outcome.send(from, reply);
        }
        Command::Login { username, password } => {
            if let Some(current) = sessions.display_name(from) {
                let reply = format!("You are already logged in as {}.\n", current);
                audit(sessions, log, from, &command);
                outcome.send(from, reply);
            } else if username.is_empty() || password.is_empty() {
                outcome.send(from, "Usage: ~login <username> <password>\n");
            } else {
                let reply = match sessions.login(from, username, password) {
                    Ok(()) => {
                        audit(sessions, log, from, &command);
                        format!("Login successful! Welcome, {}.\n", username)
                    }
                    Err(err) => auth_reply(&err),
                };
                outcome.send(from, reply);
            }
        }
        Command::GetList => {
            audit(sessions, log, from, &command);
            let mut list = String::from("Logged-in users:\n");
            for username in sessions.list_logged_in() {
                list.push_str(" - ");
                list.push_str(&username);
                list.push('\n');
            }
            outcome.send(from, list);
        }
        Command::Logout => {
            audit(sessions, log, from, &command);
            outcome.send(from, "Logging out. Goodbye!\n");
            sessions.logout(from);
            outcome.close = true;
        }
        Command::Send { target, body } => {
            let Some(sender) = sessions.display_name(from).map(str::to_string) else {
                outcome.send(from, NOT_LOGGED_IN);
                return outcome;
            };
            audit(sessions, log, from, &command);

            if target.is_empty() || body.is_empty() {
                outcome.send(from, "Usage: ~send <username> <message>\n");
            } else if let Some(recipient) = sessions.find_connection_by_username(target) {
                let private = format!("[Private] {}: {}\n", sender, body);
                if private.len() > MAX_TEXT_LEN {
                    let reply = format!("Message to {} is too long to deliver.\n", target);
                    outcome.send(from, reply);
                } else {
                    outcome.send(recipient, private);
                    outcome.send(from, format!("Message sent to {}\n", target));
                }
            } else {
                outcome.send(from, format!("User '{}' is not online.\n", target));
            }
        }
        Command::GetLog => {
            audit(sessions, log, from, &command);
            match log.read_public() {
                Ok(Some(lines)) => {
                    outcome.send(from, "Public Message Log:\n");
                    for line in lines {
                        outcome.send(from, format!("{}\n", line));
                    }
                }
                Ok(None) => outcome.send(from, "No public messages log found.\n"),
                Err(err) => {
                    error!("Failed to read public message log: {}", err);
                    outcome.send(from, "Unable to read the public message log.\n");
                }
            }
        }
        Command::Chat(body) => {
            let Some(sender) = sessions.display_name(from).map(str::to_string) else {
                outcome.send(from, NOT_LOGGED_IN);
                return outcome;
            };

            if let Err(err) = log.append_public(body) {
                error!("Failed to append to public message log: {}", err);
            }

            let message = format!("{}: {}\n", sender, body);
            for peer in sessions.authenticated_peers(from) {
                outcome.send(peer, message.clone());
            }
        }
    }

    outcome
}

/// Writes the audit entry when the connection has a bound identity
fn audit(sessions: &SessionTable, log: &mut dyn ChatLog, from: ConnectionId, command: &Command) {
    let (Some(username), Some(entry)) = (sessions.display_name(from), command.audit_entry())
    else {
        return;
    };

    if let Err(err) = log.append_command(username, &entry) {
        error!("Failed to append to command log: {}", err);
    }
}

fn auth_reply(err: &AuthError) -> String {
    match err {
        AuthError::InvalidArgs => "Username and password are required.\n".to_string(),
        AuthError::CapacityExceeded => {
            "Registration declined: server has reached user capacity.\n".to_string()
        }
        AuthError::UsernameTaken => "Registration failed: username already exists.\n".to_string(),
        AuthError::NotFound => "Login failed: username not found.\n".to_string(),
        AuthError::WrongPassword => "Login failed: incorrect password.\n".to_string(),
        AuthError::AlreadyLoggedIn => {
            "Login failed: this user is already logged in elsewhere.\n".to_string()
        }
        AuthError::UnknownConnection(id) => format!("Login failed: unknown connection {}.\n", id),
    }
}
