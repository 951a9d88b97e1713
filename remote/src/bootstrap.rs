//! Bootstrap command for the remote agent
//!
//! The interactive command channel only runs a command string, so the agent binary
//! travels inside it: the payload is base64-encoded into a heredoc, decoded to
//! [`AGENT_INSTALL_PATH`], made executable and started on the transfer port with its
//! standard streams redirected to or from the remote file.
//!
//! The redirection is the inverse of the operator-facing direction. On upload the local
//! client sends, so the agent *receives* and writes the file (`> file`); on download the
//! agent reads the file and *sends* it (`< file`). [`AgentRole`] makes that explicit.

use crate::Direction;

/// Where the agent binary is written inside the container
pub const AGENT_INSTALL_PATH: &str = "/tmp/taskcp-agent";

/// Heredoc delimiter, base64 output never contains it
const HEREDOC_DELIMITER: &str = "EOF_OF_AGENT_COMMAND";

/// base64 line length, matches coreutils `base64` output
const LINE_WIDTH: usize = 76;

/// Stream role of the remote agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    /// Agent writes what it receives on the connection to the remote file
    Receive,
    /// Agent sends the remote file over the connection
    Send,
}

impl AgentRole {
    /// The agent always plays the opposite role of the local client
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Upload => AgentRole::Receive,
            Direction::Download => AgentRole::Send,
        }
    }

    /// Shell redirection applied to the agent's standard streams
    pub fn redirection(self) -> &'static str {
        match self {
            AgentRole::Receive => ">",
            AgentRole::Send => "<",
        }
    }
}

/// Inputs of the bootstrap command
#[derive(Debug, Clone, Copy)]
pub struct BootstrapSpec<'a> {
    pub payload: &'a [u8],
    pub install_path: &'a str,
    pub port: u16,
    pub direction: Direction,
    pub remote_path: &'a str,
}

/// Escape a value for use inside a double-quoted shell word
fn double_quote_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn encode_payload(payload: &[u8]) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
    // base64 alphabet is ASCII so byte chunks are valid str boundaries
    encoded
        .as_bytes()
        .chunks(LINE_WIDTH)
        .map(|line| std::str::from_utf8(line).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the full command string passed to the interactive command channel
pub fn render(spec: &BootstrapSpec<'_>) -> String {
    let role = AgentRole::for_direction(spec.direction);
    format!(
        "sh -e -c 'base64 -d <<{delim} > {cmd}\n\
        {payload}\n\
        {delim}\n\
        \n\
        chmod +x {cmd}\n\
        {cmd} {port} {redirect} \"{file}\"\n\
        '\n",
        delim = HEREDOC_DELIMITER,
        cmd = spec.install_path,
        payload = encode_payload(spec.payload),
        port = spec.port,
        redirect = role.redirection(),
        file = double_quote_escape(spec.remote_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(direction: Direction, remote_path: &str) -> BootstrapSpec<'_> {
        BootstrapSpec {
            payload: b"\x7fELF agent",
            install_path: AGENT_INSTALL_PATH,
            port: 12345,
            direction,
            remote_path,
        }
    }

    fn last_command_line(script: &str) -> &str {
        script
            .lines()
            .rev()
            .find(|line| line.starts_with(AGENT_INSTALL_PATH))
            .expect("agent start line")
    }

    // the redirection is deliberately inverted relative to the operator's direction
    #[test]
    fn upload_makes_agent_write_the_file() {
        let script = render(&spec(Direction::Upload, "/tmp/README.md"));
        assert_eq!(
            last_command_line(&script),
            "/tmp/taskcp-agent 12345 > \"/tmp/README.md\""
        );
        assert_eq!(
            AgentRole::for_direction(Direction::Upload),
            AgentRole::Receive
        );
    }

    #[test]
    fn download_makes_agent_read_the_file() {
        let script = render(&spec(Direction::Download, "/var/log/app.log"));
        assert_eq!(
            last_command_line(&script),
            "/tmp/taskcp-agent 12345 < \"/var/log/app.log\""
        );
        assert_eq!(
            AgentRole::for_direction(Direction::Download),
            AgentRole::Send
        );
    }

    #[test]
    fn script_layout() {
        let script = render(&spec(Direction::Upload, "/tmp/x"));
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines[0],
            "sh -e -c 'base64 -d <<EOF_OF_AGENT_COMMAND > /tmp/taskcp-agent"
        );
        assert_eq!(lines[1], "f0VMRiBhZ2VudA==");
        assert_eq!(lines[2], "EOF_OF_AGENT_COMMAND");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "chmod +x /tmp/taskcp-agent");
        assert_eq!(lines[6], "'");
        assert!(script.ends_with("'\n"));
    }

    #[test]
    fn payload_is_wrapped_and_decodes_back() {
        use base64::Engine;
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let encoded = encode_payload(&payload);
        assert!(encoded.lines().all(|line| line.len() <= LINE_WIDTH));
        let joined: String = encoded.lines().collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(joined)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn remote_path_is_escaped_for_double_quotes() {
        let script = render(&spec(Direction::Download, "/tmp/a \"b\" $HOME `x`\\"));
        assert_eq!(
            last_command_line(&script),
            "/tmp/taskcp-agent 12345 < \"/tmp/a \\\"b\\\" \\$HOME \\`x\\`\\\\\""
        );
    }
}
